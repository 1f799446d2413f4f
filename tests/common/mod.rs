//! Shared helpers for integration tests: in-memory collaborators and dump
//! fixture builders.
//!
//! The fakes implement the same traits the real Subversion subprocess
//! layer does, so the whole scheduler/rewriter pipeline runs end-to-end
//! in-process, and every byte that would have been piped to
//! `svnadmin load` can be inspected.

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use chrono::{DateTime, TimeZone, Utc};

use svnmeld::merge::{Destination, SourceHistory};

// ---------------------------------------------------------------------------
// Dump fixtures
// ---------------------------------------------------------------------------

/// One node inside a fixture revision.
pub struct NodeFixture {
    pub path: String,
    pub action: &'static str,
    pub copyfrom: Option<(u64, String)>,
    pub content: Option<Vec<u8>>,
}

impl NodeFixture {
    pub fn add(path: &str, content: &[u8]) -> Self {
        Self {
            path: path.to_owned(),
            action: "add",
            copyfrom: None,
            content: Some(content.to_vec()),
        }
    }

    pub fn copy(path: &str, copyfrom_rev: u64, copyfrom_path: &str) -> Self {
        Self {
            path: path.to_owned(),
            action: "add",
            copyfrom: Some((copyfrom_rev, copyfrom_path.to_owned())),
            content: None,
        }
    }
}

/// Serialize one incremental dump (preamble + a single revision block)
/// the way `svnadmin dump --incremental -r N` would.
pub fn build_dump(rev: u64, nodes: &[NodeFixture]) -> Vec<u8> {
    let props = b"K 10\nsvn:author\nV 5\nalice\nPROPS-END\n";
    let mut out = Vec::new();
    out.extend_from_slice(b"SVN-fs-dump-format-version: 2\n\n");
    out.extend_from_slice(b"UUID: 6b1f9a3c-8d21-4f6e-9a5d-0c3b7f18e2d4\n\n");
    out.extend_from_slice(format!("Revision-number: {rev}\n").as_bytes());
    out.extend_from_slice(format!("Prop-content-length: {}\n", props.len()).as_bytes());
    out.extend_from_slice(format!("Content-length: {}\n", props.len()).as_bytes());
    out.extend_from_slice(b"\n");
    out.extend_from_slice(props);
    out.extend_from_slice(b"\n");

    for node in nodes {
        out.extend_from_slice(format!("Node-path: {}\n", node.path).as_bytes());
        out.extend_from_slice(format!("Node-action: {}\n", node.action).as_bytes());
        if let Some((from_rev, from_path)) = &node.copyfrom {
            out.extend_from_slice(format!("Node-copyfrom-rev: {from_rev}\n").as_bytes());
            out.extend_from_slice(format!("Node-copyfrom-path: {from_path}\n").as_bytes());
        }
        if let Some(content) = &node.content {
            out.extend_from_slice(b"Node-kind: file\n");
            out.extend_from_slice(
                format!("Text-content-length: {}\n", content.len()).as_bytes(),
            );
            out.extend_from_slice(format!("Content-length: {}\n", content.len()).as_bytes());
            out.extend_from_slice(b"\n");
            out.extend_from_slice(content);
            out.extend_from_slice(b"\n\n");
        } else {
            out.extend_from_slice(b"\n\n");
        }
    }
    out
}

// ---------------------------------------------------------------------------
// In-memory source
// ---------------------------------------------------------------------------

/// A scripted source history: a name, timestamps, and one prebuilt dump
/// per revision.
pub struct MemorySource {
    pub name: String,
    pub timestamps: Vec<DateTime<Utc>>,
    pub dumps: Vec<Vec<u8>>,
}

impl MemorySource {
    /// A source whose revision `k` is an empty revision at `minutes[k-1]`
    /// past a fixed base hour.
    pub fn empty_revisions(name: &str, minutes: &[u32]) -> Self {
        Self {
            name: name.to_owned(),
            timestamps: minutes.iter().map(|&m| at_minute(m)).collect(),
            dumps: (1..=minutes.len() as u64)
                .map(|rev| build_dump(rev, &[]))
                .collect(),
        }
    }
}

impl SourceHistory for MemorySource {
    type Error = Infallible;

    fn name(&self) -> &str {
        &self.name
    }

    fn revision_timestamps(&self) -> Result<Vec<DateTime<Utc>>, Infallible> {
        Ok(self.timestamps.clone())
    }

    fn revision_dump(&self, rev: u64) -> Result<Vec<u8>, Infallible> {
        Ok(self.dumps[rev as usize - 1].clone())
    }
}

// ---------------------------------------------------------------------------
// In-memory destination
// ---------------------------------------------------------------------------

/// One committed destination revision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Commit {
    Namespace(String),
    Revision { namespace: String, dump: Vec<u8> },
}

/// Records every commit in order; shared handle survives `Merger::run`
/// consuming the destination.
#[derive(Clone, Default)]
pub struct MemoryDestination {
    pub commits: Rc<RefCell<Vec<Commit>>>,
}

impl MemoryDestination {
    pub fn new() -> (Self, Rc<RefCell<Vec<Commit>>>) {
        let dest = Self::default();
        let handle = Rc::clone(&dest.commits);
        (dest, handle)
    }
}

impl Destination for MemoryDestination {
    type Error = Infallible;

    fn create_namespace(&mut self, name: &str) -> Result<(), Infallible> {
        self.commits
            .borrow_mut()
            .push(Commit::Namespace(name.to_owned()));
        Ok(())
    }

    fn load_revision(&mut self, namespace: &str, dump: &[u8]) -> Result<(), Infallible> {
        self.commits.borrow_mut().push(Commit::Revision {
            namespace: namespace.to_owned(),
            dump: dump.to_vec(),
        });
        Ok(())
    }

    fn committed_revision(&self) -> Result<u64, Infallible> {
        Ok(self.commits.borrow().len() as u64)
    }
}

/// A timestamp `minutes` past 10:00 on a fixed day.
pub fn at_minute(minutes: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, minutes, 0).unwrap()
}
