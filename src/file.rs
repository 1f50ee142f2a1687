/*!
 * Remote file facade
 *
 * A [`RemoteFileHandle`] pairs one native file object with the
 * [`AuthenticationContext`] it was opened under. Every operation goes to
 * that object only; its failures arrive already translated to
 * [`StatusError`].
 *
 * ```no_run
 * use smb_bridge::{AuthenticationContext, ClientRegistry, ProtocolGeneration, RemoteFileHandle};
 * use smb_bridge::client::memory::MemoryServer;
 * use std::sync::Arc;
 *
 * # fn main() -> smb_bridge::Result<()> {
 * let server = Arc::new(MemoryServer::new("nas").with_share("docs"));
 * let registry = ClientRegistry::with_memory_clients(server);
 * let ctx = AuthenticationContext::builder(ProtocolGeneration::Smb214)
 *     .username("alice")
 *     .password("secret")
 *     .build(&registry)?;
 *
 * let dir = RemoteFileHandle::new("smb://nas/docs/", &ctx)?;
 * for child in dir.list_files()?.unwrap_or_default() {
 *     println!("{} {}", child.name()?, child.length()?);
 * }
 * # Ok(())
 * # }
 * ```
 */

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::auth::AuthenticationContext;
use crate::client::{InputStream, OutputStream, RemoteObject};
use crate::error::{Result, StatusError};
use crate::generation::ProtocolGeneration;
use crate::types::{FileAttributes, ResourceType};
use crate::url::SmbUrl;

/// File or directory on an SMB server, bound to one authentication context
pub struct RemoteFileHandle {
    generation: ProtocolGeneration,
    url: String,
    context: Arc<AuthenticationContext>,
    object: Option<Box<dyn RemoteObject>>,
}

impl RemoteFileHandle {
    /// Open `url` with the generation and credentials of `context`
    ///
    /// No request is sent; the URL is only parsed and handed to the client.
    pub fn new(url: &str, context: &Arc<AuthenticationContext>) -> Result<Self> {
        let parsed = SmbUrl::parse(url)?;
        let object = context.open_object(&parsed)?;
        Self::bind(object, Arc::clone(context), url.to_string())
    }

    /// Wrap an already opened native object
    ///
    /// Fails unless `object` belongs to the generation of `context`. The
    /// handle's URL is the object's own path.
    pub fn from_remote_object(object: Box<dyn RemoteObject>, context: Arc<AuthenticationContext>) -> Result<Self> {
        let url = object.path();
        Self::bind(object, context, url)
    }

    fn bind(object: Box<dyn RemoteObject>, context: Arc<AuthenticationContext>, url: String) -> Result<Self> {
        let generation = context.generation();
        if object.generation() != generation {
            return Err(StatusError::construction(format!(
                "Cannot bind a {} file to a {} authentication context",
                object.generation(),
                generation
            ))
            .with_generation(generation));
        }

        Ok(Self {
            generation,
            url,
            context,
            object: Some(object),
        })
    }

    pub fn generation(&self) -> ProtocolGeneration {
        self.generation
    }

    /// URL the handle was opened with, as the caller wrote it
    ///
    /// Handles from a listing or [`from_remote_object`](Self::from_remote_object)
    /// report the object's path.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn context(&self) -> &Arc<AuthenticationContext> {
        &self.context
    }

    pub fn is_closed(&self) -> bool {
        self.object.is_none()
    }

    fn object(&self) -> Result<&dyn RemoteObject> {
        self.object.as_deref().ok_or_else(|| {
            StatusError::construction(format!("{} handle for {} is closed", self.generation, self.url))
                .with_generation(self.generation)
        })
    }

    pub fn exists(&self) -> Result<bool> {
        self.object()?.exists()
    }

    pub fn delete(&self) -> Result<()> {
        debug!(generation = %self.generation, url = %self.url, "delete");
        self.object()?.delete()
    }

    pub fn mkdir(&self) -> Result<()> {
        self.object()?.mkdir()
    }

    /// Create the directory and any missing parents
    pub fn mkdirs(&self) -> Result<()> {
        self.object()?.mkdirs()
    }

    pub fn attributes(&self) -> Result<FileAttributes> {
        self.object()?.attributes().map(FileAttributes::from_raw)
    }

    pub fn input_stream(&self) -> Result<InputStream> {
        self.object()?.input_stream()
    }

    /// Writer replacing the file's content; creates the file if missing
    pub fn output_stream(&self) -> Result<OutputStream> {
        self.object()?.output_stream()
    }

    pub fn connect(&self) -> Result<()> {
        self.object()?.connect()
    }

    /// Create an empty file; fails if it already exists
    pub fn create_new(&self) -> Result<()> {
        self.object()?.create_new()
    }

    /// Last path component; directories keep their trailing `/`
    pub fn name(&self) -> Result<String> {
        Ok(self.object()?.name())
    }

    pub fn path(&self) -> Result<String> {
        Ok(self.object()?.path())
    }

    pub fn canonical_path(&self) -> Result<String> {
        Ok(self.object()?.canonical_path())
    }

    /// Share name, `None` for server-level URLs
    pub fn share(&self) -> Result<Option<String>> {
        Ok(self.object()?.share())
    }

    pub fn resource_type(&self) -> Result<ResourceType> {
        self.object()?.resource_type().map(ResourceType::from_code)
    }

    pub fn unc_path(&self) -> Result<String> {
        Ok(self.object()?.unc_path())
    }

    pub fn parent(&self) -> Result<String> {
        Ok(self.object()?.parent())
    }

    pub fn can_read(&self) -> Result<bool> {
        self.object()?.can_read()
    }

    pub fn can_write(&self) -> Result<bool> {
        self.object()?.can_write()
    }

    pub fn is_directory(&self) -> Result<bool> {
        self.object()?.is_directory()
    }

    pub fn is_file(&self) -> Result<bool> {
        self.object()?.is_file()
    }

    pub fn is_hidden(&self) -> Result<bool> {
        self.object()?.is_hidden()
    }

    /// Size in bytes
    pub fn length(&self) -> Result<u64> {
        self.object()?.length()
    }

    /// Entry names in the order the server returned them
    pub fn list(&self) -> Result<Option<Vec<String>>> {
        self.object()?.list()
    }

    /// Child handles sharing this handle's context
    ///
    /// Keeps the server's order; `None` when the client produced no listing.
    #[instrument(skip(self), fields(generation = %self.generation, url = %self.url))]
    pub fn list_files(&self) -> Result<Option<Vec<RemoteFileHandle>>> {
        let Some(children) = self.object()?.list_files()? else {
            debug!("No listing returned");
            return Ok(None);
        };

        let handles = children
            .into_iter()
            .map(|child| RemoteFileHandle::from_remote_object(child, Arc::clone(&self.context)))
            .collect::<Result<Vec<_>>>()?;
        debug!(count = handles.len(), "Listed directory");
        Ok(Some(handles))
    }

    /// Rename or move to `dest`
    ///
    /// `dest` must be an open handle of the same generation; otherwise this
    /// fails before any request is made.
    pub fn rename_to(&self, dest: &RemoteFileHandle) -> Result<()> {
        let source = self.object()?;
        let target = match &dest.object {
            Some(object) if dest.generation == self.generation => object.as_ref(),
            _ => {
                return Err(StatusError::construction(format!(
                    "Null {} file specified.",
                    self.generation
                ))
                .with_generation(self.generation))
            }
        };
        debug!(generation = %self.generation, from = %self.url, to = %dest.url, "rename");
        source.rename_to(target)
    }

    /// Set the modification time, in milliseconds since the Unix epoch
    pub fn set_last_modified(&self, millis: i64) -> Result<()> {
        self.object()?.set_last_modified(millis)
    }

    /// Modification time in milliseconds since the Unix epoch
    pub fn last_modified(&self) -> Result<i64> {
        self.object()?.last_modified()
    }

    pub fn last_modified_time(&self) -> Result<DateTime<Utc>> {
        let millis = self.last_modified()?;
        DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            StatusError::transport(format!("Modification time {} is out of range", millis), None)
                .with_generation(self.generation)
        })
    }

    /// Release the native handle
    ///
    /// The SMB1 client has no close primitive, so this does nothing there.
    /// Closing twice is not an error.
    pub fn close(&mut self) -> Result<()> {
        if self.generation.is_legacy() {
            return Ok(());
        }
        match self.object.take() {
            Some(mut object) => {
                debug!(generation = %self.generation, url = %self.url, "close");
                object.close()
            }
            None => Ok(()),
        }
    }
}

impl fmt::Debug for RemoteFileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFileHandle")
            .field("generation", &self.generation)
            .field("url", &self.url)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::MemoryServer;
    use crate::client::registry::ClientRegistry;
    use std::io::{Read, Write};

    fn setup(generation: ProtocolGeneration) -> (Arc<MemoryServer>, Arc<AuthenticationContext>) {
        crate::logging::init_test_logging();
        let server = Arc::new(MemoryServer::new("nas").with_share("docs"));
        server.put_file("docs/readme.txt", b"hello");
        let registry = ClientRegistry::with_memory_clients(Arc::clone(&server));
        let ctx = AuthenticationContext::builder(generation)
            .username("alice")
            .build(&registry)
            .unwrap();
        (server, ctx)
    }

    #[test]
    fn test_handle_takes_context_generation() {
        let (_server, ctx) = setup(ProtocolGeneration::Smb211);
        let handle = RemoteFileHandle::new("smb://nas/docs/readme.txt", &ctx).unwrap();
        assert_eq!(handle.generation(), ProtocolGeneration::Smb211);
        assert!(Arc::ptr_eq(handle.context(), &ctx));
        assert_eq!(handle.url(), "smb://nas/docs/readme.txt");
    }

    #[test]
    fn test_url_is_kept_as_written() {
        let (_server, ctx) = setup(ProtocolGeneration::Smb212);
        let handle = RemoteFileHandle::new("smb://nas/docs/./readme.txt", &ctx).unwrap();
        assert_eq!(handle.url(), "smb://nas/docs/./readme.txt");
        assert_eq!(handle.canonical_path().unwrap(), "smb://nas/docs/readme.txt");
        assert_eq!(handle.length().unwrap(), 5);

        let dir = RemoteFileHandle::new("smb://nas/docs/", &ctx).unwrap();
        let children = dir.list_files().unwrap().unwrap();
        assert_eq!(children[0].url(), children[0].path().unwrap());
    }

    #[test]
    fn test_invalid_url_fails_before_any_request() {
        let (server, ctx) = setup(ProtocolGeneration::Smb212);
        let err = RemoteFileHandle::new("docs/readme.txt", &ctx).unwrap_err();
        assert!(err.is_construction());
        assert_eq!(server.request_count(), 0);
    }

    #[test]
    fn test_read_and_write() {
        let (server, ctx) = setup(ProtocolGeneration::Smb214);
        let file = RemoteFileHandle::new("smb://nas/docs/notes.txt", &ctx).unwrap();
        {
            let mut out = file.output_stream().unwrap();
            out.write_all(b"line one").unwrap();
            out.flush().unwrap();
        }
        let mut content = String::new();
        file.input_stream().unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "line one");
        assert_eq!(file.length().unwrap(), 8);
        assert_eq!(server.read_file("docs/notes.txt"), Some(b"line one".to_vec()));
    }

    #[test]
    fn test_protocol_error_keeps_status() {
        let (_server, ctx) = setup(ProtocolGeneration::Smb201);
        let file = RemoteFileHandle::new("smb://nas/docs/missing.txt", &ctx).unwrap();
        let err = file.length().unwrap_err();
        assert!(err.is_protocol());
        assert_eq!(err.status_code(), 0xC000_0034);
        assert_eq!(err.generation(), Some(ProtocolGeneration::Smb201));
        assert!(err.cause().is_some());
    }

    #[test]
    fn test_attributes_and_type() {
        let (_server, ctx) = setup(ProtocolGeneration::Smb212);
        let dir = RemoteFileHandle::new("smb://nas/docs/", &ctx).unwrap();
        assert!(dir.attributes().unwrap().contains(FileAttributes::DIRECTORY));
        assert_eq!(dir.resource_type().unwrap(), ResourceType::Share);
        assert_eq!(dir.share().unwrap().as_deref(), Some("docs"));
        assert_eq!(dir.name().unwrap(), "docs/");
    }

    #[test]
    fn test_last_modified_time() {
        let (_server, ctx) = setup(ProtocolGeneration::Smb214);
        let file = RemoteFileHandle::new("smb://nas/docs/readme.txt", &ctx).unwrap();
        file.set_last_modified(1_700_000_000_000).unwrap();
        assert_eq!(file.last_modified().unwrap(), 1_700_000_000_000);
        assert_eq!(file.last_modified_time().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_close_on_legacy_is_noop() {
        let (server, ctx) = setup(ProtocolGeneration::Smb1);
        let mut file = RemoteFileHandle::new("smb://nas/docs/readme.txt", &ctx).unwrap();
        file.exists().unwrap();
        file.close().unwrap();
        file.close().unwrap();
        assert!(!file.is_closed());
        assert!(file.exists().unwrap());
        assert_eq!(server.close_count(), 0);
    }

    #[test]
    fn test_close_releases_handle() {
        let (server, ctx) = setup(ProtocolGeneration::Smb212);
        let mut file = RemoteFileHandle::new("smb://nas/docs/readme.txt", &ctx).unwrap();
        file.exists().unwrap();
        file.close().unwrap();
        assert!(file.is_closed());
        assert_eq!(server.close_count(), 1);

        file.close().unwrap();
        assert_eq!(server.close_count(), 1);

        let err = file.exists().unwrap_err();
        assert!(err.is_construction());
        assert_eq!(err.status_code(), 0);
    }

    #[test]
    fn test_rename_to_closed_destination_fails_fast() {
        let (server, ctx) = setup(ProtocolGeneration::Smb214);
        let source = RemoteFileHandle::new("smb://nas/docs/readme.txt", &ctx).unwrap();
        let mut dest = RemoteFileHandle::new("smb://nas/docs/renamed.txt", &ctx).unwrap();
        dest.close().unwrap();

        let before = server.request_count();
        let err = source.rename_to(&dest).unwrap_err();
        assert!(err.is_construction());
        assert!(err.message().contains("Null SMB214 file specified."));
        assert_eq!(server.request_count(), before);
    }
}
