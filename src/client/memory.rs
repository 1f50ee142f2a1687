//! In-memory SMB client and server
//!
//! A complete [`SmbLibrary`] backed by a share tree held in process memory.
//! It negotiates dialects, checks credentials and reports failures as
//! NTSTATUS codes the way a wire client does, so facade behavior can be
//! exercised for every generation without a network.
//!
//! Directory entries are listed in creation order.

use std::collections::{HashMap, HashSet};
use std::io::{self, Cursor, Write};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::trace;

use super::{InputStream, OutputStream, SmbFileApi, SmbLibrary};
use crate::config::{ClientProperties, PROP_IPC_SIGNING_ENFORCED, PROP_MAX_VERSION, PROP_MIN_VERSION};
use crate::generation::{ProtocolGeneration, SmbDialect};
use crate::ntstatus::NtStatus;
use crate::resolver::{NameService, NetbiosName, StaticNameService};
use crate::types::FileAttributes;
use crate::url::SmbUrl;

/// Errors raised by the in-memory client
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("{message}")]
    Status { status: NtStatus, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid client configuration: {0}")]
    Config(String),
}

impl MemoryError {
    fn status(status: NtStatus, message: impl Into<String>) -> Self {
        MemoryError::Status {
            status,
            message: message.into(),
        }
    }

    pub fn nt_status(&self) -> Option<NtStatus> {
        match self {
            MemoryError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

type MemoryResult<T> = std::result::Result<T, MemoryError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Directory,
    File,
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    data: Vec<u8>,
    attributes: u32,
    modified: i64,
    children: Vec<String>,
}

impl Node {
    fn directory() -> Self {
        Self {
            kind: NodeKind::Directory,
            data: Vec::new(),
            attributes: FileAttributes::DIRECTORY.bits(),
            modified: now_millis(),
            children: Vec::new(),
        }
    }

    fn file(data: Vec<u8>) -> Self {
        Self {
            kind: NodeKind::File,
            data,
            attributes: FileAttributes::ARCHIVE.bits(),
            modified: now_millis(),
            children: Vec::new(),
        }
    }

    fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Node key of a URL: "" for the server, "share" or "share/a/b" below it
fn node_key(url: &SmbUrl) -> String {
    match url.share() {
        None => String::new(),
        Some(share) => {
            let mut key = share.to_string();
            for segment in url.segments() {
                key.push('/');
                key.push_str(segment);
            }
            key
        }
    }
}

fn parent_key(key: &str) -> Option<&str> {
    if key.is_empty() {
        return None;
    }
    Some(key.rsplit_once('/').map_or("", |(parent, _)| parent))
}

fn leaf_name(key: &str) -> &str {
    key.rsplit_once('/').map_or(key, |(_, leaf)| leaf)
}

fn is_share_key(key: &str) -> bool {
    !key.is_empty() && !key.contains('/')
}

struct ServerState {
    nodes: HashMap<String, Node>,
    account: Option<(String, SecretString)>,
    denied: HashSet<String>,
    dialects: (SmbDialect, SmbDialect),
}

impl ServerState {
    fn is_denied(&self, key: &str) -> bool {
        self.denied
            .iter()
            .any(|d| key == d || key.starts_with(&format!("{}/", d)))
    }

    /// Lookup failure matching what a server reports for `key`
    fn missing(&self, key: &str) -> MemoryError {
        let share = key.split('/').next().unwrap_or_default();
        if !self.nodes.contains_key(share) {
            return MemoryError::status(
                NtStatus::BAD_NETWORK_NAME,
                format!("The network name cannot be found: {}", share),
            );
        }
        match parent_key(key) {
            Some(parent) if !self.nodes.contains_key(parent) => MemoryError::status(
                NtStatus::OBJECT_PATH_NOT_FOUND,
                format!("The system cannot find the path specified: {}", key),
            ),
            _ => MemoryError::status(
                NtStatus::OBJECT_NAME_NOT_FOUND,
                format!("The system cannot find the file specified: {}", key),
            ),
        }
    }

    fn node(&self, key: &str) -> MemoryResult<&Node> {
        self.nodes.get(key).ok_or_else(|| self.missing(key))
    }

    fn node_mut(&mut self, key: &str) -> MemoryResult<&mut Node> {
        if !self.nodes.contains_key(key) {
            return Err(self.missing(key));
        }
        self.nodes
            .get_mut(key)
            .ok_or_else(|| MemoryError::status(NtStatus::UNSUCCESSFUL, key.to_string()))
    }

    /// Add `node` at `key` below an existing directory
    fn insert(&mut self, key: &str, node: Node) -> MemoryResult<()> {
        if self.nodes.contains_key(key) {
            return Err(MemoryError::status(
                NtStatus::OBJECT_NAME_COLLISION,
                format!("Cannot create a file when that file already exists: {}", key),
            ));
        }
        let parent = parent_key(key).unwrap_or_default();
        let parent_node = self.nodes.get_mut(parent).filter(|n| n.is_directory());
        match parent_node {
            Some(parent_node) => parent_node.children.push(leaf_name(key).to_string()),
            None => {
                return Err(MemoryError::status(
                    NtStatus::OBJECT_PATH_NOT_FOUND,
                    format!("The system cannot find the path specified: {}", key),
                ))
            }
        }
        self.nodes.insert(key.to_string(), node);
        Ok(())
    }

    /// Detach `key` and everything below it, returning the removed nodes
    fn detach(&mut self, key: &str) -> Vec<(String, Node)> {
        let prefix = format!("{}/", key);
        let keys: Vec<String> = self
            .nodes
            .keys()
            .filter(|k| k.as_str() == key || k.starts_with(&prefix))
            .cloned()
            .collect();
        let removed = keys
            .into_iter()
            .filter_map(|k| self.nodes.remove(&k).map(|node| (k, node)))
            .collect();

        if let Some(parent) = parent_key(key).and_then(|p| self.nodes.get_mut(p)) {
            let leaf = leaf_name(key);
            parent.children.retain(|child| child != leaf);
        }
        removed
    }
}

/// Share tree plus the host identity the in-memory client connects to
pub struct MemoryServer {
    host: String,
    address: IpAddr,
    workgroup: String,
    state: Mutex<ServerState>,
    requests: AtomicUsize,
    closes: AtomicUsize,
}

impl MemoryServer {
    pub fn new(host: impl Into<String>) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(String::new(), Node::directory());
        Self {
            host: host.into(),
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            workgroup: "WORKGROUP".to_string(),
            state: Mutex::new(ServerState {
                nodes,
                account: None,
                denied: HashSet::new(),
                dialects: (SmbDialect::Smb1, SmbDialect::Smb311),
            }),
            requests: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.address = address;
        self
    }

    pub fn with_share(self, name: &str) -> Self {
        self.add_share(name);
        self
    }

    /// Require this user name and password on every request
    pub fn with_account(self, username: &str, password: &str) -> Self {
        self.state().account = Some((
            username.to_string(),
            SecretString::new(password.to_string().into_boxed_str()),
        ));
        self
    }

    /// Restrict the dialects the server accepts
    pub fn with_dialects(self, min: SmbDialect, max: SmbDialect) -> Self {
        self.state().dialects = (min, max);
        self
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn add_share(&self, name: &str) {
        let mut state = self.state();
        if !state.nodes.contains_key(name) {
            let _ = state.insert(name, Node::directory());
        }
    }

    /// Create a directory and any missing parents; `path` starts with the share
    pub fn put_dir(&self, path: &str) {
        let mut state = self.state();
        let mut key = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if !key.is_empty() {
                key.push('/');
            }
            key.push_str(segment);
            if !state.nodes.contains_key(&key) {
                let _ = state.insert(&key, Node::directory());
            }
        }
    }

    /// Create or replace a file, creating parent directories
    pub fn put_file(&self, path: &str, data: &[u8]) {
        let key = path.trim_matches('/').to_string();
        if let Some(parent) = parent_key(&key) {
            self.put_dir(parent);
        }
        let mut state = self.state();
        let _ = state.detach(&key);
        let _ = state.insert(&key, Node::file(data.to_vec()));
    }

    pub fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        let state = self.state();
        state
            .nodes
            .get(path.trim_matches('/'))
            .filter(|n| !n.is_directory())
            .map(|n| n.data.clone())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state().nodes.contains_key(path.trim_matches('/'))
    }

    pub fn set_attributes(&self, path: &str, attributes: FileAttributes) {
        if let Some(node) = self.state().nodes.get_mut(path.trim_matches('/')) {
            node.attributes = attributes.bits();
        }
    }

    /// Answer every request on `path` and below with access denied
    pub fn deny(&self, path: &str) {
        self.state().denied.insert(path.trim_matches('/').to_string());
    }

    /// Requests served so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Native handles released by `close`
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Name table advertising this server
    pub fn name_service(&self) -> StaticNameService {
        let netbios = self.host.to_ascii_uppercase();
        StaticNameService::new().with_host(
            &self.host,
            self.address,
            vec![
                NetbiosName::unique(netbios.clone(), 0x00),
                NetbiosName::group(self.workgroup.clone(), 0x00),
                NetbiosName::unique(netbios, 0x20),
            ],
        )
    }

    fn serves(&self, host: &str) -> bool {
        host.eq_ignore_ascii_case(&self.host) || host == self.address.to_string()
    }

    /// Validate one request and hand out the locked tree
    fn session(&self, url: &SmbUrl, credentials: &MemoryCredentials) -> MemoryResult<MutexGuard<'_, ServerState>> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        if !self.serves(url.host()) {
            return Err(MemoryError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("Failed to connect to {}", url.host()),
            )));
        }

        let state = self.state();

        let (server_min, server_max) = state.dialects;
        let (client_min, client_max) = credentials.dialect_range;
        if client_max < server_min || client_min > server_max {
            return Err(MemoryError::status(
                NtStatus::NOT_SUPPORTED,
                format!(
                    "No common dialect: client {}-{}, server {}-{}",
                    client_min, client_max, server_min, server_max
                ),
            ));
        }

        if let Some((username, password)) = &state.account {
            let identity = &credentials.identity;
            if identity.username != *username
                || identity.secret.expose_secret() != password.expose_secret()
            {
                return Err(MemoryError::status(
                    NtStatus::LOGON_FAILURE,
                    "Logon failure: unknown user name or bad password.",
                ));
            }
        }

        let key = node_key(url);
        if state.is_denied(&key) {
            return Err(MemoryError::status(
                NtStatus::ACCESS_DENIED,
                format!("Access is denied: {}", url),
            ));
        }

        trace!(url = %url, "memory request");
        Ok(state)
    }
}

/// Base context: the validated property map
#[derive(Debug, Clone)]
pub struct MemoryContext {
    properties: ClientProperties,
    dialect_range: (SmbDialect, SmbDialect),
}

#[derive(Debug)]
struct Identity {
    domain: String,
    username: String,
    secret: SecretString,
}

/// Context with bound credentials
#[derive(Debug, Clone)]
pub struct MemoryCredentials {
    properties: ClientProperties,
    dialect_range: (SmbDialect, SmbDialect),
    identity: Arc<Identity>,
}

impl MemoryCredentials {
    pub fn properties(&self) -> &ClientProperties {
        &self.properties
    }

    pub fn domain(&self) -> &str {
        &self.identity.domain
    }

    pub fn username(&self) -> &str {
        &self.identity.username
    }

    /// Dialects this client offers during negotiation
    pub fn dialect_range(&self) -> (SmbDialect, SmbDialect) {
        self.dialect_range
    }
}

/// In-memory client library for one generation
pub struct MemoryLibrary {
    generation: ProtocolGeneration,
    server: Arc<MemoryServer>,
}

impl MemoryLibrary {
    pub fn new(generation: ProtocolGeneration, server: Arc<MemoryServer>) -> Self {
        Self { generation, server }
    }

    fn dialect_property(&self, properties: &ClientProperties, key: &str, fallback: SmbDialect) -> MemoryResult<SmbDialect> {
        match properties.get(key) {
            Some(value) => value
                .parse::<SmbDialect>()
                .map_err(|_| MemoryError::Config(format!("{} = {} is not a dialect", key, value))),
            None => Ok(fallback),
        }
    }
}

impl SmbLibrary for MemoryLibrary {
    type Context = MemoryContext;
    type Credentials = MemoryCredentials;
    type File = MemoryFile;
    type Error = MemoryError;

    fn generation(&self) -> ProtocolGeneration {
        self.generation
    }

    fn new_context(&self, properties: &ClientProperties) -> MemoryResult<MemoryContext> {
        let Some((default_min, default_max)) = self.generation.default_version_range() else {
            if !properties.is_empty() {
                return Err(MemoryError::Config(
                    "the SMB1 client takes no properties".to_string(),
                ));
            }
            return Ok(MemoryContext {
                properties: properties.clone(),
                dialect_range: (SmbDialect::Smb1, SmbDialect::Smb1),
            });
        };

        let min = self.dialect_property(properties, PROP_MIN_VERSION, default_min)?;
        let max = self.dialect_property(properties, PROP_MAX_VERSION, default_max)?;
        if min > max {
            return Err(MemoryError::Config(format!(
                "minimum dialect {} is above maximum {}",
                min, max
            )));
        }
        if min == SmbDialect::Smb1 {
            return Err(MemoryError::Config(format!(
                "{} client cannot negotiate SMB1",
                self.generation
            )));
        }
        if let Some(value) = properties.get(PROP_IPC_SIGNING_ENFORCED) {
            if value.parse::<bool>().is_err() {
                return Err(MemoryError::Config(format!(
                    "{} = {} is not a boolean",
                    PROP_IPC_SIGNING_ENFORCED, value
                )));
            }
        }

        Ok(MemoryContext {
            properties: properties.clone(),
            dialect_range: (min, max),
        })
    }

    fn bind_credentials(
        &self,
        context: MemoryContext,
        domain: &str,
        username: &str,
        secret: &SecretString,
    ) -> MemoryResult<MemoryCredentials> {
        Ok(MemoryCredentials {
            properties: context.properties,
            dialect_range: context.dialect_range,
            identity: Arc::new(Identity {
                domain: domain.to_string(),
                username: username.to_string(),
                secret: SecretString::new(secret.expose_secret().to_string().into_boxed_str()),
            }),
        })
    }

    fn open(&self, url: &SmbUrl, credentials: &MemoryCredentials) -> MemoryResult<MemoryFile> {
        Ok(MemoryFile {
            server: Arc::clone(&self.server),
            url: url.clone(),
            credentials: credentials.clone(),
            open: AtomicBool::new(false),
        })
    }

    fn name_service(&self) -> MemoryResult<Arc<dyn NameService>> {
        Ok(Arc::new(self.server.name_service()))
    }

    fn status_code(&self, error: &MemoryError) -> Option<u32> {
        error.nt_status().map(NtStatus::code)
    }
}

/// File object of the in-memory client
///
/// Opening does no I/O. The first request opens the native handle; after
/// `close` the next request reopens it.
pub struct MemoryFile {
    server: Arc<MemoryServer>,
    url: SmbUrl,
    credentials: MemoryCredentials,
    open: AtomicBool,
}

impl MemoryFile {
    pub fn url(&self) -> &SmbUrl {
        &self.url
    }

    fn key(&self) -> String {
        node_key(&self.url)
    }

    fn session(&self) -> MemoryResult<MutexGuard<'_, ServerState>> {
        let state = self.server.session(&self.url, &self.credentials)?;
        self.open.store(true, Ordering::SeqCst);
        Ok(state)
    }

    fn child(&self, name: &str, directory: bool) -> MemoryResult<MemoryFile> {
        let url = self.url.child(name, directory).map_err(|e| {
            MemoryError::status(NtStatus::OBJECT_NAME_INVALID, e.message().to_string())
        })?;
        Ok(MemoryFile {
            server: Arc::clone(&self.server),
            url,
            credentials: self.credentials.clone(),
            open: AtomicBool::new(false),
        })
    }

    fn listing(&self) -> MemoryResult<Option<Vec<(String, bool)>>> {
        let state = self.session()?;
        let node = state.node(&self.key())?;
        if !node.is_directory() {
            return Ok(None);
        }
        let base = self.key();
        let entries = node
            .children
            .iter()
            .map(|name| {
                let child_key = if base.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", base, name)
                };
                let is_dir = state
                    .nodes
                    .get(&child_key)
                    .is_some_and(Node::is_directory);
                (name.clone(), is_dir)
            })
            .collect();
        Ok(Some(entries))
    }
}

impl SmbFileApi for MemoryFile {
    type Error = MemoryError;

    fn exists(&self) -> MemoryResult<bool> {
        let state = self.session()?;
        Ok(state.nodes.contains_key(&self.key()))
    }

    fn delete(&self) -> MemoryResult<()> {
        let key = self.key();
        let mut state = self.session()?;
        if key.is_empty() || is_share_key(&key) {
            return Err(MemoryError::status(
                NtStatus::ACCESS_DENIED,
                format!("Cannot delete {}", self.url),
            ));
        }
        state.node(&key)?;
        state.detach(&key);
        Ok(())
    }

    fn mkdir(&self) -> MemoryResult<()> {
        let key = self.key();
        let mut state = self.session()?;
        if key.is_empty() || is_share_key(&key) {
            return Err(MemoryError::status(
                NtStatus::ACCESS_DENIED,
                format!("Cannot create {}", self.url),
            ));
        }
        state.insert(&key, Node::directory())
    }

    fn mkdirs(&self) -> MemoryResult<()> {
        let key = self.key();
        let mut state = self.session()?;
        if key.is_empty() || is_share_key(&key) {
            return Err(MemoryError::status(
                NtStatus::ACCESS_DENIED,
                format!("Cannot create {}", self.url),
            ));
        }

        let mut partial = String::new();
        for segment in key.split('/') {
            if !partial.is_empty() {
                partial.push('/');
            }
            partial.push_str(segment);
            if partial == key {
                break;
            }
            match state.nodes.get(&partial) {
                Some(node) if node.is_directory() => {}
                Some(_) => {
                    return Err(MemoryError::status(
                        NtStatus::NOT_A_DIRECTORY,
                        format!("Not a directory: {}", partial),
                    ))
                }
                None if is_share_key(&partial) => return Err(state.missing(&partial)),
                None => state.insert(&partial, Node::directory())?,
            }
        }
        state.insert(&key, Node::directory())
    }

    fn attributes(&self) -> MemoryResult<u32> {
        let state = self.session()?;
        Ok(state.node(&self.key())?.attributes)
    }

    fn input_stream(&self) -> MemoryResult<InputStream> {
        let state = self.session()?;
        let node = state.node(&self.key())?;
        if node.is_directory() {
            return Err(MemoryError::status(
                NtStatus::FILE_IS_A_DIRECTORY,
                format!("Is a directory: {}", self.url),
            ));
        }
        Ok(Box::new(Cursor::new(node.data.clone())))
    }

    fn output_stream(&self) -> MemoryResult<OutputStream> {
        let key = self.key();
        let mut state = self.session()?;
        if key.is_empty() || is_share_key(&key) {
            return Err(MemoryError::status(
                NtStatus::FILE_IS_A_DIRECTORY,
                format!("Is a directory: {}", self.url),
            ));
        }

        match state.nodes.get_mut(&key) {
            Some(node) if node.is_directory() => {
                return Err(MemoryError::status(
                    NtStatus::FILE_IS_A_DIRECTORY,
                    format!("Is a directory: {}", self.url),
                ))
            }
            Some(node) => {
                node.data.clear();
                node.modified = now_millis();
            }
            None => state.insert(&key, Node::file(Vec::new()))?,
        }

        Ok(Box::new(MemoryWriter {
            server: Arc::clone(&self.server),
            key,
            buffer: Vec::new(),
            dirty: false,
        }))
    }

    fn connect(&self) -> MemoryResult<()> {
        let key = self.key();
        let state = self.session()?;
        if let Some(share) = key.split('/').next().filter(|s| !s.is_empty()) {
            state.node(share)?;
        }
        Ok(())
    }

    fn create_new(&self) -> MemoryResult<()> {
        let key = self.key();
        let mut state = self.session()?;
        if key.is_empty() || is_share_key(&key) {
            return Err(MemoryError::status(
                NtStatus::OBJECT_NAME_COLLISION,
                format!("Cannot create {}", self.url),
            ));
        }
        state.insert(&key, Node::file(Vec::new()))
    }

    fn name(&self) -> String {
        self.url.name()
    }

    fn path(&self) -> String {
        self.url.as_str().to_string()
    }

    fn canonical_path(&self) -> String {
        self.url.canonical()
    }

    fn share(&self) -> Option<String> {
        self.url.share().map(str::to_string)
    }

    fn unc_path(&self) -> String {
        self.url.unc()
    }

    fn parent(&self) -> String {
        self.url.parent()
    }

    fn resource_type(&self) -> MemoryResult<u32> {
        let _state = self.session()?;
        let code = match self.url.share() {
            None => 4,
            Some(share) if self.url.segments().is_empty() => {
                if share.eq_ignore_ascii_case("IPC$") {
                    16
                } else {
                    8
                }
            }
            Some(_) => 1,
        };
        Ok(code)
    }

    fn can_read(&self) -> MemoryResult<bool> {
        self.exists()
    }

    fn can_write(&self) -> MemoryResult<bool> {
        let state = self.session()?;
        Ok(state
            .nodes
            .get(&self.key())
            .is_some_and(|n| n.attributes & FileAttributes::READ_ONLY.bits() == 0))
    }

    fn is_directory(&self) -> MemoryResult<bool> {
        let state = self.session()?;
        Ok(state.nodes.get(&self.key()).is_some_and(Node::is_directory))
    }

    fn is_file(&self) -> MemoryResult<bool> {
        let state = self.session()?;
        Ok(state
            .nodes
            .get(&self.key())
            .is_some_and(|n| !n.is_directory()))
    }

    fn is_hidden(&self) -> MemoryResult<bool> {
        let key = self.key();
        let state = self.session()?;
        if is_share_key(&key) && key.ends_with('$') {
            return Ok(true);
        }
        Ok(state
            .nodes
            .get(&key)
            .is_some_and(|n| n.attributes & FileAttributes::HIDDEN.bits() != 0))
    }

    fn length(&self) -> MemoryResult<u64> {
        let state = self.session()?;
        let node = state.node(&self.key())?;
        Ok(node.data.len() as u64)
    }

    fn list(&self) -> MemoryResult<Option<Vec<String>>> {
        Ok(self
            .listing()?
            .map(|entries| entries.into_iter().map(|(name, _)| name).collect()))
    }

    fn list_files(&self) -> MemoryResult<Option<Vec<MemoryFile>>> {
        match self.listing()? {
            None => Ok(None),
            Some(entries) => entries
                .into_iter()
                .map(|(name, is_dir)| self.child(&name, is_dir))
                .collect::<MemoryResult<Vec<_>>>()
                .map(Some),
        }
    }

    fn rename_to(&self, dest: &MemoryFile) -> MemoryResult<()> {
        if !Arc::ptr_eq(&self.server, &dest.server) {
            return Err(MemoryError::status(
                NtStatus::NOT_SAME_DEVICE,
                format!("{} and {} are on different servers", self.url, dest.url),
            ));
        }

        let source = self.key();
        let target = dest.key();
        let mut state = self.session()?;

        if source.is_empty() || is_share_key(&source) || target.is_empty() || is_share_key(&target) {
            return Err(MemoryError::status(
                NtStatus::ACCESS_DENIED,
                format!("Cannot rename {} to {}", self.url, dest.url),
            ));
        }
        if source.split('/').next() != target.split('/').next() {
            return Err(MemoryError::status(
                NtStatus::NOT_SAME_DEVICE,
                format!("Cannot move {} to another share", self.url),
            ));
        }
        if state.is_denied(&target) {
            return Err(MemoryError::status(
                NtStatus::ACCESS_DENIED,
                format!("Access is denied: {}", dest.url),
            ));
        }
        if target.starts_with(&format!("{}/", source)) {
            return Err(MemoryError::status(
                NtStatus::INVALID_PARAMETER,
                format!("Cannot move {} into itself", self.url),
            ));
        }

        state.node(&source)?;
        if state.nodes.contains_key(&target) {
            return Err(MemoryError::status(
                NtStatus::OBJECT_NAME_COLLISION,
                format!("Cannot create a file when that file already exists: {}", dest.url),
            ));
        }
        match parent_key(&target).and_then(|p| state.nodes.get(p)) {
            Some(parent) if parent.is_directory() => {}
            _ => return Err(state.missing(&target)),
        }

        let moved = state.detach(&source);
        let mut root = None;
        for (key, node) in moved {
            if key == source {
                root = Some(node);
            } else {
                let renamed = format!("{}{}", target, &key[source.len()..]);
                state.nodes.insert(renamed, node);
            }
        }
        if let Some(node) = root {
            state.insert(&target, node)?;
        }
        Ok(())
    }

    fn set_last_modified(&self, millis: i64) -> MemoryResult<()> {
        let key = self.key();
        let mut state = self.session()?;
        if key.is_empty() {
            return Err(MemoryError::status(
                NtStatus::ACCESS_DENIED,
                format!("Cannot modify {}", self.url),
            ));
        }
        state.node_mut(&key)?.modified = millis;
        Ok(())
    }

    fn last_modified(&self) -> MemoryResult<i64> {
        let state = self.session()?;
        Ok(state.node(&self.key())?.modified)
    }

    fn close(&mut self) -> MemoryResult<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            self.server.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Buffered writer that stores its content on flush and on drop
struct MemoryWriter {
    server: Arc<MemoryServer>,
    key: String,
    buffer: Vec<u8>,
    dirty: bool,
}

impl MemoryWriter {
    fn commit(&mut self) -> io::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.server.requests.fetch_add(1, Ordering::SeqCst);
        let mut state = self.server.state();
        match state.nodes.get_mut(&self.key) {
            Some(node) if !node.is_directory() => {
                node.data.clone_from(&self.buffer);
                node.modified = now_millis();
                self.dirty = false;
                Ok(())
            }
            _ => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} was removed while open", self.key),
            )),
        }
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.dirty = true;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.commit()
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        let _ = self.commit();
    }
}
