//! KDL-backed virtual host tree
//!
//! Virtual hosts are top-level `vhost` nodes labelled with their id;
//! directives are their child nodes and arguments are the positional
//! entries of those children.
//!
//! ```kdl
//! vhost "ocspvhost.com" {
//!     server-name "ocspvhost.com"
//!     ssl-certificate-file "/etc/apache2/ssl/cert-certbot_15.pem"
//!     ssl-certificate-key-file "/etc/apache2/ssl/key-certbot_15.pem"
//!     header "always" "set" "Strict-Transport-Security" "max-age=60"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use kdl::{KdlDocument, KdlEntry, KdlNode};
use tracing::{debug, info, trace};

use autohsts_common::HostId;

use crate::directive::{DirectiveAccessor, DirectiveLocation, HostPath};
use crate::error::TreeError;

/// Node name of a virtual host block
pub const VHOST_NODE: &str = "vhost";

/// Virtual host tree parsed from KDL
#[derive(Debug, Clone)]
pub struct KdlVhostTree {
    doc: KdlDocument,
    /// Document as of the last load or commit
    committed: KdlDocument,
    /// File the tree is written back to on commit
    path: Option<PathBuf>,
    commits: usize,
}

impl KdlVhostTree {
    /// Load the tree from a file; commits write back to it
    pub fn load(path: &Path) -> Result<Self, TreeError> {
        let content = fs::read_to_string(path)?;
        let mut tree = Self::parse(&content)?;
        tree.path = Some(path.to_path_buf());

        debug!(
            vhosts_path = %path.display(),
            vhost_count = tree.vhost_ids().len(),
            "Loaded virtual host tree"
        );
        Ok(tree)
    }

    /// Parse a tree held only in memory
    pub fn parse(content: &str) -> Result<Self, TreeError> {
        let doc = parse_document(content)?;

        Ok(Self {
            committed: doc.clone(),
            doc,
            path: None,
            commits: 0,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of successful commits since load
    pub fn commit_count(&self) -> usize {
        self.commits
    }

    /// Labels of all virtual host blocks, in document order
    pub fn vhost_ids(&self) -> Vec<HostId> {
        self.doc
            .nodes()
            .iter()
            .filter_map(vhost_label)
            .map(HostId::from)
            .collect()
    }

    /// Current document as KDL text
    pub fn render(&self) -> String {
        let mut doc = self.doc.clone();
        doc.autoformat();
        doc.to_string()
    }

    fn vhost(&self, host: &HostPath) -> Result<&KdlNode, TreeError> {
        self.doc
            .nodes()
            .get(host.index)
            .filter(|node| vhost_label(node) == Some(host.id.as_str()))
            .ok_or_else(|| stale(host))
    }

    fn vhost_mut(&mut self, host: &HostPath) -> Result<&mut KdlNode, TreeError> {
        self.doc
            .nodes_mut()
            .get_mut(host.index)
            .filter(|node| vhost_label(node) == Some(host.id.as_str()))
            .ok_or_else(|| stale(host))
    }

    fn directive(&self, location: &DirectiveLocation) -> Result<&KdlNode, TreeError> {
        self.vhost(&location.host)?
            .children()
            .and_then(|children| children.nodes().get(location.directive))
            .ok_or_else(|| invalid(location))
    }

    fn directive_mut(&mut self, location: &DirectiveLocation) -> Result<&mut KdlNode, TreeError> {
        self.vhost_mut(&location.host)?
            .children_mut()
            .as_mut()
            .and_then(|children| children.nodes_mut().get_mut(location.directive))
            .ok_or_else(|| invalid(location))
    }
}

impl DirectiveAccessor for KdlVhostTree {
    fn resolve_host(&self, host: &HostId) -> Result<HostPath, TreeError> {
        let matches: Vec<usize> = self
            .doc
            .nodes()
            .iter()
            .enumerate()
            .filter(|(_, node)| vhost_label(node) == Some(host.as_str()))
            .map(|(index, _)| index)
            .collect();

        match matches.as_slice() {
            [index] => Ok(HostPath {
                index: *index,
                id: host.clone(),
            }),
            [] => Err(TreeError::HostNotFound { host: host.clone() }),
            _ => Err(TreeError::AmbiguousHost {
                host: host.clone(),
                count: matches.len(),
            }),
        }
    }

    fn find(
        &self,
        name: &str,
        arg: Option<&str>,
        host: &HostPath,
    ) -> Result<Vec<DirectiveLocation>, TreeError> {
        let vhost = self.vhost(host)?;
        let Some(children) = vhost.children() else {
            return Ok(Vec::new());
        };

        let mut found = Vec::new();
        for (directive, node) in children.nodes().iter().enumerate() {
            if !node.name().value().eq_ignore_ascii_case(name) {
                continue;
            }

            for (index, entry) in positional(node).enumerate() {
                let matches = match arg {
                    Some(wanted) => entry_text(entry).eq_ignore_ascii_case(wanted),
                    None => true,
                };
                if matches {
                    found.push(DirectiveLocation {
                        host: host.clone(),
                        directive,
                        arg: index,
                    });
                }
            }
        }

        trace!(
            host = %host.id,
            directive = name,
            matches = found.len(),
            "Searched virtual host directives"
        );
        Ok(found)
    }

    fn get(&self, location: &DirectiveLocation) -> Result<Option<String>, TreeError> {
        let node = self.directive(location)?;
        Ok(positional(node).nth(location.arg).map(entry_text))
    }

    fn set(&mut self, location: &DirectiveLocation, value: &str) -> Result<(), TreeError> {
        let node = self.directive_mut(location)?;
        let entry = node
            .entries_mut()
            .iter_mut()
            .filter(|e| e.name().is_none())
            .nth(location.arg)
            .ok_or_else(|| invalid(location))?;

        *entry = KdlEntry::new(value.to_string());
        Ok(())
    }

    fn add(&mut self, host: &HostPath, name: &str, args: &[String]) -> Result<(), TreeError> {
        let vhost = self.vhost_mut(host)?;

        let mut node = KdlNode::new(name);
        for arg in args {
            node.push(KdlEntry::new(arg.clone()));
        }
        vhost.ensure_children().nodes_mut().push(node);

        trace!(host = %host.id, directive = name, "Added directive");
        Ok(())
    }

    fn remove(&mut self, location: &DirectiveLocation) -> Result<(), TreeError> {
        let vhost = self.vhost_mut(&location.host)?;
        let children = vhost
            .children_mut()
            .as_mut()
            .filter(|children| location.directive < children.nodes().len())
            .ok_or_else(|| invalid(location))?;

        children.nodes_mut().remove(location.directive);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), TreeError> {
        if let Some(path) = &self.path {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "vhosts.kdl".to_string());
            let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

            fs::write(&tmp_path, self.render())?;
            fs::rename(&tmp_path, path)?;

            info!(vhosts_path = %path.display(), "Saved virtual host configuration");
        }

        self.committed = self.doc.clone();
        self.commits += 1;
        Ok(())
    }

    fn reload(&mut self) -> Result<(), TreeError> {
        if let Some(path) = &self.path {
            let doc = parse_document(&fs::read_to_string(path)?)?;
            trace!(vhosts_path = %path.display(), "Reloaded virtual host tree");
            self.committed = doc;
        }

        self.doc = self.committed.clone();
        Ok(())
    }
}

fn parse_document(content: &str) -> Result<KdlDocument, TreeError> {
    content
        .parse()
        .map_err(|e: kdl::KdlError| TreeError::Parse(e.to_string()))
}

/// Label of a `vhost` node, if `node` is one
fn vhost_label(node: &KdlNode) -> Option<&str> {
    if node.name().value() != VHOST_NODE {
        return None;
    }
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
}

/// Positional (unnamed) entries of a node
fn positional(node: &KdlNode) -> impl Iterator<Item = &KdlEntry> {
    node.entries().iter().filter(|e| e.name().is_none())
}

/// Argument value as text; non-string values use their KDL rendering
fn entry_text(entry: &KdlEntry) -> String {
    match entry.value().as_string() {
        Some(s) => s.to_string(),
        None => entry.value().to_string(),
    }
}

fn stale(host: &HostPath) -> TreeError {
    TreeError::InvalidLocation(format!(
        "no virtual host '{}' at position {}",
        host.id, host.index
    ))
}

fn invalid(location: &DirectiveLocation) -> TreeError {
    TreeError::InvalidLocation(location.to_string())
}
