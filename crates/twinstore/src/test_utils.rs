use crate::attachment::{Attachment, AttachmentOptions, Owner};
use crate::backend::mem_backend::Journal;
use crate::backend::{BackendFactory, BackendKind, FsBackend, MemBackend, StorageBackend};
use crate::error::Result;
use crate::model::{PendingWrite, Style};
use crate::policy::{MigrationFlags, StoragePolicy};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

pub const REMOTE_URL: &str = "https://bucket.test";

/// A minimal owning record.
#[derive(Debug)]
pub struct Doc {
    pub id: u64,
}

impl Doc {
    pub fn new(id: u64) -> Rc<Self> {
        Rc::new(Self { id })
    }
}

impl Owner for Doc {
    fn owner_id(&self) -> String {
        self.id.to_string()
    }
}

/// `original` holds `content`; `thumbnail` holds it with a `thumb:` prefix.
pub fn renditions(content: &[u8]) -> Vec<(Style, PendingWrite)> {
    let mut thumbnail = b"thumb:".to_vec();
    thumbnail.extend_from_slice(content);
    vec![
        (Style::original(), PendingWrite::new(content.to_vec())),
        (Style::new("thumbnail"), PendingWrite::new(thumbnail)),
    ]
}

enum Local {
    Fs(FsBackend),
    Mem(Rc<MemBackend>),
}

/// Hands out the same local and remote backends to every attachment, so a
/// test can inspect what the attachment stored.
pub struct TestFactory {
    local: Local,
    remote: Rc<MemBackend>,
}

impl BackendFactory for TestFactory {
    fn build(&self, kind: BackendKind, _attachment: &str) -> Result<Box<dyn StorageBackend>> {
        let backend: Box<dyn StorageBackend> = match (kind, &self.local) {
            (BackendKind::Filesystem, Local::Fs(fs)) => Box::new(fs.clone()),
            (BackendKind::Filesystem, Local::Mem(mem)) => Box::new(mem.clone()),
            _ => Box::new(self.remote.clone()),
        };
        Ok(backend)
    }
}

pub struct TestEnv {
    // Keeps the directory alive until the test is done
    pub _temp_dir: TempDir,
    /// Filesystem backend root.
    pub root: PathBuf,
    pub flags: Rc<MigrationFlags>,
    pub remote: Rc<MemBackend>,
    pub journal: Journal,
    pub factory: TestFactory,
}

impl TestEnv {
    /// Filesystem primary under a temp dir, in-memory alternate store.
    pub fn new(dual_write: bool, read_from_alternate: bool) -> Self {
        let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
        let root = temp_dir.path().join("public").join("system");
        let local = Local::Fs(FsBackend::new(root.clone(), "/system"));
        let remote = Rc::new(MemBackend::new(REMOTE_URL));
        Self::build(
            temp_dir,
            root,
            local,
            remote,
            Journal::default(),
            dual_write,
            read_from_alternate,
        )
    }

    /// Both backends in memory, recording their calls into one journal as
    /// `local` and `remote`.
    pub fn with_journal(dual_write: bool, read_from_alternate: bool) -> Self {
        let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
        let root = temp_dir.path().join("public").join("system");
        let journal = Journal::default();
        let local = MemBackend::new("/system").with_journal("local", journal.clone());
        let remote = MemBackend::new(REMOTE_URL).with_journal("remote", journal.clone());
        Self::build(
            temp_dir,
            root,
            Local::Mem(Rc::new(local)),
            Rc::new(remote),
            journal,
            dual_write,
            read_from_alternate,
        )
    }

    /// In-memory primary, so tests can make local deletes fail.
    pub fn with_memory_primary(dual_write: bool) -> Self {
        Self::with_journal(dual_write, false)
    }

    fn build(
        temp_dir: TempDir,
        root: PathBuf,
        local: Local,
        remote: Rc<MemBackend>,
        journal: Journal,
        dual_write: bool,
        read_from_alternate: bool,
    ) -> Self {
        Self {
            _temp_dir: temp_dir,
            root,
            flags: MigrationFlags::new(dual_write, read_from_alternate),
            remote: remote.clone(),
            journal,
            factory: TestFactory { local, remote },
        }
    }

    /// `avatars` with a `thumbnail` style, driven by [`Self::flags`].
    pub fn attachment(&self, doc: &Rc<Doc>) -> Attachment<Doc> {
        let options = AttachmentOptions::new()
            .style("thumbnail")
            .policy(StoragePolicy::from_flags(self.flags.clone()))
            .alternate_storage(BackendKind::Memory);
        Attachment::new("avatars", doc, options, &self.factory)
            .expect("failed to build attachment")
    }

    /// The in-memory primary of a journaled env.
    pub fn local_mem(&self) -> Rc<MemBackend> {
        match &self.factory.local {
            Local::Mem(mem) => mem.clone(),
            Local::Fs(_) => panic!("env has a filesystem primary"),
        }
    }

    /// Every file under the filesystem root, sorted.
    pub fn local_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        collect_files(&self.root, &mut files);
        files.sort();
        files
    }

    /// Write `content` to a staging file outside the storage root.
    pub fn stage(&self, name: &str, content: &[u8]) -> PathBuf {
        let dir = self._temp_dir.path().join("staging");
        fs::create_dir_all(&dir).expect("failed to create staging dir");
        let path = dir.join(name);
        fs::write(&path, content).expect("failed to stage file");
        path
    }
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, files);
        } else {
            files.push(path);
        }
    }
}
