//! Module graph discovery.
//!
//! Starting from the configured entries, every reachable module is read
//! once, scanned for references and resolved. The graph is kept in ordered
//! maps keyed by project-relative id, so iteration order is deterministic.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::paths::{relative_slash, to_slash};
use crate::resolve::{ModuleKind, Resolution, ResolveError, Resolver};
use crate::scan::scan_references;

/// Project-relative, `/`-separated module identifier.
pub type ModuleId = String;

/// Where a module's content came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    /// Read from disk
    File,
    /// Injected by a plugin, derived from another module
    Synthetic {
        /// Module the content was extracted from
        parent: ModuleId,
    },
}

/// What a dependency edge points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyTarget {
    /// Another module in the graph
    Module(ModuleId),
    /// A runtime global
    External(String),
}

/// An edge from one module to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Reference as written in the requesting module (synthetic ids for implicit edges)
    pub specifier: String,
    /// Edge target
    pub target: DependencyTarget,
    /// Added by a plugin rather than written in source; loaded with the module
    pub implicit: bool,
}

/// A module in the graph.
#[derive(Debug, Clone)]
pub struct Module {
    /// Stable identifier
    pub id: ModuleId,
    /// Absolute path (virtual for synthetic modules)
    pub path: PathBuf,
    /// Detected kind
    pub kind: ModuleKind,
    /// Raw content
    pub content: Vec<u8>,
    /// Outgoing edges in order of appearance
    pub dependencies: Vec<Dependency>,
    /// Provenance
    pub origin: ModuleOrigin,
}

/// Error type for graph discovery.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GraphError {
    /// A reference could not be resolved
    #[error("{source}")]
    Unresolved {
        /// File containing the reference
        requester: PathBuf,
        /// Resolver failure
        #[source]
        source: ResolveError,
    },
    /// A discovered file could not be read
    #[error("failed to read '{}': {source}", path.display())]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// An entry resolved to an external global
    #[error("entry '{name}' refers to external '{reference}', which cannot be bundled")]
    ExternalEntry {
        /// Entry name
        name: String,
        /// Entry reference
        reference: String,
    },
}

/// The complete set of modules reachable from the entries.
#[derive(Debug, Clone)]
pub struct ModuleGraph {
    root: PathBuf,
    entries: Vec<(String, ModuleId)>,
    modules: BTreeMap<ModuleId, Module>,
    pending: Vec<ModuleId>,
}

impl ModuleGraph {
    /// Create an empty graph rooted at the project directory.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            entries: Vec::new(),
            modules: BTreeMap::new(),
            pending: Vec::new(),
        }
    }

    /// Discover every module reachable from `entries` (`(name, reference)`).
    ///
    /// Entries resolve relative to the project root; `requester` is reported
    /// as the referencing file when an entry cannot be found.
    pub fn discover(
        root: &Path,
        entries: &[(String, String)],
        resolver: &Resolver,
        requester: &Path,
    ) -> Result<Self, GraphError> {
        let mut graph = ModuleGraph::new(root);
        let mut queue: VecDeque<ModuleId> = VecDeque::new();

        for (name, reference) in entries {
            let resolved = match resolver.resolve(reference, root) {
                Ok(Resolution::Module(resolved)) => resolved,
                Ok(Resolution::External(_)) => {
                    return Err(GraphError::ExternalEntry {
                        name: name.clone(),
                        reference: reference.clone(),
                    })
                }
                Err(source) => {
                    return Err(GraphError::Unresolved {
                        requester: requester.to_path_buf(),
                        source,
                    })
                }
            };
            let id = graph.module_id(&resolved.path);
            if graph.add_file(&id, &resolved.path, resolved.kind)? {
                queue.push_back(id.clone());
            }
            graph.entries.push((name.clone(), id));
        }

        graph.walk(queue, resolver)?;
        Ok(graph)
    }

    /// Scan and resolve queued modules, queueing newly found files.
    fn walk(
        &mut self,
        mut queue: VecDeque<ModuleId>,
        resolver: &Resolver,
    ) -> Result<(), GraphError> {
        while let Some(id) = queue.pop_front() {
            let (path, kind, text) = match self.modules.get(&id) {
                Some(module) => (
                    module.path.clone(),
                    module.kind,
                    String::from_utf8_lossy(&module.content).into_owned(),
                ),
                None => continue,
            };
            let from_dir =
                path.parent().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());

            let mut dependencies = Vec::new();
            for scanned in scan_references(kind, &text) {
                let resolution = match resolver.resolve(&scanned.specifier, &from_dir) {
                    Ok(resolution) => resolution,
                    Err(primary) => match &scanned.fallback {
                        Some(fallback) => {
                            resolver.resolve(fallback, &from_dir).map_err(|_| {
                                GraphError::Unresolved { requester: path.clone(), source: primary }
                            })?
                        }
                        None => {
                            return Err(GraphError::Unresolved {
                                requester: path.clone(),
                                source: primary,
                            })
                        }
                    },
                };

                let target = match resolution {
                    Resolution::External(global) => DependencyTarget::External(global),
                    Resolution::Module(resolved) => {
                        let dep_id = self.module_id(&resolved.path);
                        if self.add_file(&dep_id, &resolved.path, resolved.kind)? {
                            queue.push_back(dep_id.clone());
                        }
                        DependencyTarget::Module(dep_id)
                    }
                };
                dependencies.push(Dependency {
                    specifier: scanned.specifier,
                    target,
                    implicit: false,
                });
            }

            debug!(module = %id, dependencies = dependencies.len(), "scanned module");
            if let Some(module) = self.modules.get_mut(&id) {
                module.dependencies = dependencies;
            }
        }
        Ok(())
    }

    /// Scan the synthetic modules added since the last call and resolve
    /// their references relative to the parent module's directory.
    pub fn scan_pending(&mut self, resolver: &Resolver) -> Result<(), GraphError> {
        let queue: VecDeque<ModuleId> = self.pending.drain(..).collect();
        self.walk(queue, resolver)
    }

    /// Read and insert a file module. Returns `false` if it was already present.
    fn add_file(&mut self, id: &str, path: &Path, kind: ModuleKind) -> Result<bool, GraphError> {
        if self.modules.contains_key(id) {
            return Ok(false);
        }
        let content = fs::read(path)
            .map_err(|source| GraphError::Read { path: path.to_path_buf(), source })?;
        self.modules.insert(
            id.to_string(),
            Module {
                id: id.to_string(),
                path: path.to_path_buf(),
                kind,
                content,
                dependencies: Vec::new(),
                origin: ModuleOrigin::File,
            },
        );
        Ok(true)
    }

    /// Id for a path: project-relative when inside the root, else absolute.
    pub fn module_id(&self, path: &Path) -> ModuleId {
        relative_slash(path, &self.root).unwrap_or_else(|| to_slash(path))
    }

    /// Project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entries as `(name, module id)`, in name order.
    pub fn entries(&self) -> &[(String, ModuleId)] {
        &self.entries
    }

    /// Look up a module.
    pub fn get(&self, id: &str) -> Option<&Module> {
        self.modules.get(id)
    }

    /// All modules in id order.
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the graph has no modules.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Inject a synthetic module derived from `parent` and attach it as an
    /// implicit dependency of the parent.
    ///
    /// Returns the new module id, or `None` when the parent does not exist.
    pub fn add_synthetic(
        &mut self,
        parent: &str,
        suffix: &str,
        content: Vec<u8>,
    ) -> Option<ModuleId> {
        let parent_path = self.modules.get(parent)?.path.clone();
        let id = format!("{}{}", parent, suffix);
        let mut path = parent_path.into_os_string();
        path.push(suffix);
        let path = PathBuf::from(path);
        let kind = ModuleKind::from_path(&path);

        self.modules.insert(
            id.clone(),
            Module {
                id: id.clone(),
                path,
                kind,
                content,
                dependencies: Vec::new(),
                origin: ModuleOrigin::Synthetic { parent: parent.to_string() },
            },
        );
        if let Some(module) = self.modules.get_mut(parent) {
            module.dependencies.push(Dependency {
                specifier: id.clone(),
                target: DependencyTarget::Module(id.clone()),
                implicit: true,
            });
        }
        self.pending.push(id.clone());
        Some(id)
    }

    /// Module ids reachable from an entry module, breadth-first from it.
    pub fn reachable_from(&self, entry: &str) -> Vec<ModuleId> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([entry.to_string()]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(module) = self.modules.get(&id) {
                for dep in &module.dependencies {
                    if let DependencyTarget::Module(target) = &dep.target {
                        queue.push_back(target.clone());
                    }
                }
                order.push(id);
            }
        }
        order
    }

    /// External globals referenced anywhere in the graph.
    pub fn externals(&self) -> BTreeSet<&str> {
        self.modules
            .values()
            .flat_map(|m| m.dependencies.iter())
            .filter_map(|d| match &d.target {
                DependencyTarget::External(global) => Some(global.as_str()),
                DependencyTarget::Module(_) => None,
            })
            .collect()
    }
}
