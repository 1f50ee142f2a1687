//! Bridges a typed [`SmbLibrary`] to the erased [`Dialect`] and
//! [`RemoteObject`] traits

use std::any::Any;
use std::sync::Arc;

use secrecy::SecretString;
use tracing::debug;

use super::{Dialect, InputStream, OutputStream, RemoteObject, SmbFileApi, SmbLibrary};
use crate::auth::CredentialHandle;
use crate::config::ClientProperties;
use crate::error::{Result, StatusError};
use crate::generation::ProtocolGeneration;
use crate::resolver::NameService;
use crate::url::SmbUrl;

/// Registry entry wrapping one client library
pub struct LibraryAdapter<L: SmbLibrary> {
    library: Arc<L>,
}

impl<L: SmbLibrary> LibraryAdapter<L> {
    pub fn new(library: L) -> Self {
        Self {
            library: Arc::new(library),
        }
    }

    pub fn library(&self) -> &L {
        &self.library
    }
}

impl<L: SmbLibrary> Dialect for LibraryAdapter<L> {
    fn generation(&self) -> ProtocolGeneration {
        self.library.generation()
    }

    fn build_credentials(
        &self,
        properties: &ClientProperties,
        domain: &str,
        username: &str,
        secret: &SecretString,
    ) -> Result<CredentialHandle> {
        let generation = self.generation();
        let context = self
            .library
            .new_context(properties)
            .map_err(|e| construction_failure(generation, "client context", e))?;
        let credentials = self
            .library
            .bind_credentials(context, domain, username, secret)
            .map_err(|e| construction_failure(generation, "credential binding", e))?;

        debug!(%generation, properties = properties.len(), "Bound credentials");
        Ok(CredentialHandle::new(generation, credentials))
    }

    fn open(&self, url: &SmbUrl, credentials: &CredentialHandle) -> Result<Box<dyn RemoteObject>> {
        let generation = self.generation();
        if credentials.generation() != generation {
            return Err(StatusError::construction(format!(
                "{} credentials cannot open a {} file",
                credentials.generation(),
                generation
            ))
            .with_generation(generation));
        }
        let native = credentials.downcast_ref::<L::Credentials>().ok_or_else(|| {
            StatusError::construction(format!(
                "Credential handle was not built by the {} client",
                generation
            ))
            .with_generation(generation)
        })?;

        let file = self
            .library
            .open(url, native)
            .map_err(|e| self.library.translate(e))?;
        Ok(Box::new(AdaptedFile {
            file,
            library: Arc::clone(&self.library),
        }))
    }

    fn name_service(&self) -> Result<Arc<dyn NameService>> {
        self.library
            .name_service()
            .map_err(|e| self.library.translate(e))
    }
}

fn construction_failure<E>(generation: ProtocolGeneration, stage: &str, error: E) -> StatusError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StatusError::construction_caused_by(
        format!("{} {} failed: {}", generation, stage, error),
        Box::new(error),
    )
    .with_generation(generation)
}

/// Native file plus the library that translates its failures
pub struct AdaptedFile<L: SmbLibrary> {
    file: L::File,
    library: Arc<L>,
}

impl<L: SmbLibrary> AdaptedFile<L> {
    pub fn native(&self) -> &L::File {
        &self.file
    }

    fn call<T>(&self, result: std::result::Result<T, L::Error>) -> Result<T> {
        result.map_err(|e| self.library.translate(e))
    }
}

impl<L: SmbLibrary> RemoteObject for AdaptedFile<L> {
    fn generation(&self) -> ProtocolGeneration {
        self.library.generation()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn exists(&self) -> Result<bool> {
        self.call(self.file.exists())
    }

    fn delete(&self) -> Result<()> {
        self.call(self.file.delete())
    }

    fn mkdir(&self) -> Result<()> {
        self.call(self.file.mkdir())
    }

    fn mkdirs(&self) -> Result<()> {
        self.call(self.file.mkdirs())
    }

    fn attributes(&self) -> Result<u32> {
        self.call(self.file.attributes())
    }

    fn input_stream(&self) -> Result<InputStream> {
        self.call(self.file.input_stream())
    }

    fn output_stream(&self) -> Result<OutputStream> {
        self.call(self.file.output_stream())
    }

    fn connect(&self) -> Result<()> {
        self.call(self.file.connect())
    }

    fn create_new(&self) -> Result<()> {
        self.call(self.file.create_new())
    }

    fn name(&self) -> String {
        self.file.name()
    }

    fn path(&self) -> String {
        self.file.path()
    }

    fn canonical_path(&self) -> String {
        self.file.canonical_path()
    }

    fn share(&self) -> Option<String> {
        self.file.share()
    }

    fn unc_path(&self) -> String {
        self.file.unc_path()
    }

    fn parent(&self) -> String {
        self.file.parent()
    }

    fn resource_type(&self) -> Result<u32> {
        self.call(self.file.resource_type())
    }

    fn can_read(&self) -> Result<bool> {
        self.call(self.file.can_read())
    }

    fn can_write(&self) -> Result<bool> {
        self.call(self.file.can_write())
    }

    fn is_directory(&self) -> Result<bool> {
        self.call(self.file.is_directory())
    }

    fn is_file(&self) -> Result<bool> {
        self.call(self.file.is_file())
    }

    fn is_hidden(&self) -> Result<bool> {
        self.call(self.file.is_hidden())
    }

    fn length(&self) -> Result<u64> {
        self.call(self.file.length())
    }

    fn list(&self) -> Result<Option<Vec<String>>> {
        self.call(self.file.list())
    }

    fn list_files(&self) -> Result<Option<Vec<Box<dyn RemoteObject>>>> {
        let children = self.call(self.file.list_files())?;
        Ok(children.map(|files| {
            files
                .into_iter()
                .map(|file| {
                    Box::new(AdaptedFile {
                        file,
                        library: Arc::clone(&self.library),
                    }) as Box<dyn RemoteObject>
                })
                .collect()
        }))
    }

    fn rename_to(&self, dest: &dyn RemoteObject) -> Result<()> {
        let generation = self.generation();
        let dest = dest
            .as_any()
            .downcast_ref::<AdaptedFile<L>>()
            .filter(|d| d.generation() == generation)
            .ok_or_else(|| {
                StatusError::construction(format!("Null {} file specified.", generation))
                    .with_generation(generation)
            })?;
        self.call(self.file.rename_to(&dest.file))
    }

    fn set_last_modified(&self, millis: i64) -> Result<()> {
        self.call(self.file.set_last_modified(millis))
    }

    fn last_modified(&self) -> Result<i64> {
        self.call(self.file.last_modified())
    }

    fn close(&mut self) -> Result<()> {
        let result = self.file.close();
        self.call(result)
    }
}
