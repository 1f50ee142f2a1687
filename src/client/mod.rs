//! Protocol client seam
//!
//! Each protocol generation is served by its own client library, modelled by
//! [`SmbLibrary`] and [`SmbFileApi`]. The associated types keep every
//! library's context, credential and error shapes intact. [`LibraryAdapter`]
//! erases them behind the object-safe [`Dialect`] and [`RemoteObject`]
//! traits the facade dispatches through, translating native failures into
//! [`StatusError`] at that boundary.
//!
//! # Example
//!
//! ```no_run
//! use smb_bridge::client::{memory::{MemoryLibrary, MemoryServer}, registry::ClientRegistry};
//! use smb_bridge::ProtocolGeneration;
//! use std::sync::Arc;
//!
//! let server = Arc::new(MemoryServer::new("nas"));
//! let registry = ClientRegistry::new();
//! registry.register_library(MemoryLibrary::new(ProtocolGeneration::Smb212, server));
//! assert!(registry.is_registered(ProtocolGeneration::Smb212));
//! ```

pub mod adapter;
pub mod memory;
pub mod registry;

use std::any::Any;
use std::io::{Read, Write};
use std::sync::Arc;

use secrecy::SecretString;

use crate::auth::CredentialHandle;
use crate::config::ClientProperties;
use crate::error::{Result, StatusError, NO_STATUS};
use crate::generation::ProtocolGeneration;
use crate::resolver::NameService;
use crate::url::SmbUrl;

pub use adapter::LibraryAdapter;

/// Byte source returned by `input_stream`
pub type InputStream = Box<dyn Read + Send>;

/// Byte sink returned by `output_stream`
pub type OutputStream = Box<dyn Write + Send>;

/// Native file object of one client library
pub trait SmbFileApi: Send + Sized + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn exists(&self) -> std::result::Result<bool, Self::Error>;
    fn delete(&self) -> std::result::Result<(), Self::Error>;
    fn mkdir(&self) -> std::result::Result<(), Self::Error>;
    fn mkdirs(&self) -> std::result::Result<(), Self::Error>;
    /// Raw DOS attribute word
    fn attributes(&self) -> std::result::Result<u32, Self::Error>;
    fn input_stream(&self) -> std::result::Result<InputStream, Self::Error>;
    fn output_stream(&self) -> std::result::Result<OutputStream, Self::Error>;
    fn connect(&self) -> std::result::Result<(), Self::Error>;
    fn create_new(&self) -> std::result::Result<(), Self::Error>;

    fn name(&self) -> String;
    fn path(&self) -> String;
    fn canonical_path(&self) -> String;
    fn share(&self) -> Option<String>;
    fn unc_path(&self) -> String;
    fn parent(&self) -> String;

    /// Raw resource type code
    fn resource_type(&self) -> std::result::Result<u32, Self::Error>;
    fn can_read(&self) -> std::result::Result<bool, Self::Error>;
    fn can_write(&self) -> std::result::Result<bool, Self::Error>;
    fn is_directory(&self) -> std::result::Result<bool, Self::Error>;
    fn is_file(&self) -> std::result::Result<bool, Self::Error>;
    fn is_hidden(&self) -> std::result::Result<bool, Self::Error>;
    fn length(&self) -> std::result::Result<u64, Self::Error>;

    /// Entry names; `None` when the library has no listing for this object
    fn list(&self) -> std::result::Result<Option<Vec<String>>, Self::Error>;
    fn list_files(&self) -> std::result::Result<Option<Vec<Self>>, Self::Error>;
    fn rename_to(&self, dest: &Self) -> std::result::Result<(), Self::Error>;

    /// Milliseconds since the Unix epoch
    fn set_last_modified(&self, millis: i64) -> std::result::Result<(), Self::Error>;
    fn last_modified(&self) -> std::result::Result<i64, Self::Error>;

    /// Release the native handle
    fn close(&mut self) -> std::result::Result<(), Self::Error>;
}

/// One generation's client library
pub trait SmbLibrary: Send + Sync + 'static {
    /// Base client context built from a property map
    type Context: Send + Sync + 'static;
    /// Context with bound credentials
    type Credentials: Send + Sync + 'static;
    type File: SmbFileApi<Error = Self::Error>;
    type Error: std::error::Error + Send + Sync + 'static;

    fn generation(&self) -> ProtocolGeneration;

    fn new_context(&self, properties: &ClientProperties) -> std::result::Result<Self::Context, Self::Error>;

    fn bind_credentials(
        &self,
        context: Self::Context,
        domain: &str,
        username: &str,
        secret: &SecretString,
    ) -> std::result::Result<Self::Credentials, Self::Error>;

    fn open(&self, url: &SmbUrl, credentials: &Self::Credentials) -> std::result::Result<Self::File, Self::Error>;

    fn name_service(&self) -> std::result::Result<Arc<dyn NameService>, Self::Error>;

    /// Protocol status carried by a native error, if it has one
    fn status_code(&self, error: &Self::Error) -> Option<u32>;

    /// Re-express a native failure, keeping it as the cause
    fn translate(&self, error: Self::Error) -> StatusError {
        let message = error.to_string();
        let code = self.status_code(&error).unwrap_or(NO_STATUS);
        StatusError::protocol(message, code, Some(Box::new(error))).with_generation(self.generation())
    }
}

/// Generation-erased view of a library, as stored in the registry
pub trait Dialect: Send + Sync {
    fn generation(&self) -> ProtocolGeneration;

    /// Build a base context from `properties` and bind the credentials to it
    fn build_credentials(
        &self,
        properties: &ClientProperties,
        domain: &str,
        username: &str,
        secret: &SecretString,
    ) -> Result<CredentialHandle>;

    fn open(&self, url: &SmbUrl, credentials: &CredentialHandle) -> Result<Box<dyn RemoteObject>>;

    fn name_service(&self) -> Result<Arc<dyn NameService>>;
}

/// Generation-erased native file object
///
/// Same operation set as [`SmbFileApi`], with failures already translated.
pub trait RemoteObject: Send {
    fn generation(&self) -> ProtocolGeneration;

    /// Concrete object, for pairing two objects of the same library
    fn as_any(&self) -> &dyn Any;

    fn exists(&self) -> Result<bool>;
    fn delete(&self) -> Result<()>;
    fn mkdir(&self) -> Result<()>;
    fn mkdirs(&self) -> Result<()>;
    fn attributes(&self) -> Result<u32>;
    fn input_stream(&self) -> Result<InputStream>;
    fn output_stream(&self) -> Result<OutputStream>;
    fn connect(&self) -> Result<()>;
    fn create_new(&self) -> Result<()>;
    fn name(&self) -> String;
    fn path(&self) -> String;
    fn canonical_path(&self) -> String;
    fn share(&self) -> Option<String>;
    fn unc_path(&self) -> String;
    fn parent(&self) -> String;
    fn resource_type(&self) -> Result<u32>;
    fn can_read(&self) -> Result<bool>;
    fn can_write(&self) -> Result<bool>;
    fn is_directory(&self) -> Result<bool>;
    fn is_file(&self) -> Result<bool>;
    fn is_hidden(&self) -> Result<bool>;
    fn length(&self) -> Result<u64>;
    fn list(&self) -> Result<Option<Vec<String>>>;
    fn list_files(&self) -> Result<Option<Vec<Box<dyn RemoteObject>>>>;
    /// `dest` must come from the same library
    fn rename_to(&self, dest: &dyn RemoteObject) -> Result<()>;
    fn set_last_modified(&self, millis: i64) -> Result<()>;
    fn last_modified(&self) -> Result<i64>;
    fn close(&mut self) -> Result<()>;
}
