//! # Bento Engine
//!
//! The bento engine loads declarative workflow definitions ("bentos") and
//! executes them: a bento is a tree of nodes, each node either a leaf task
//! backed by a registered neta implementation or a container (sequential
//! group, parallel group, repeating loop). The engine resolves inter-node
//! data dependencies, user variables, and secrets at run time, reports live
//! progress, and enforces fail-fast/partial-failure semantics.
//!
//! ## Key pieces
//!
//! - **`model`**: bento document structures (single or multi-bento)
//! - **`resolve`**: `${secret:NAME}` and `${{ ... }}` parameter resolution
//! - **`pantry`**: type-name to neta-factory registry
//! - **`progress`**: progress reporter contract and stock implementations
//! - **`itamae`**: the recursive evaluator and `serve` entry point
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use bento_engine::{Itamae, Pantry, parse_bento_file};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let bundle = parse_bento_file("release.yaml")?;
//! let spec = bundle.bentos.get("release").expect("bento exists");
//!
//! let itamae = Itamae::new(Arc::new(Pantry::new()));
//! let result = itamae
//!     .serve(&spec.root, Default::default(), CancellationToken::new())
//!     .await;
//! println!("ran {} tasks", result.tasks_executed);
//! # Ok(())
//! # }
//! ```

use std::{fs, path::Path};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;

pub mod context;
pub mod itamae;
pub mod model;
pub mod pantry;
pub mod progress;
pub mod resolve;

pub use context::RunContext;
pub use itamae::Itamae;
pub use model::{BentoBundle, BentoSpec};
pub use pantry::{Neta, NetaFactory, Pantry};
pub use progress::{ChannelProgress, NoopProgress, ProgressReporter, TracingProgress};
pub use resolve::{resolve_parameters, resolve_value};

/// Loads a bento document from the filesystem.
///
/// The file is parsed as YAML (which covers JSON documents as well), first
/// as a multi-bento bundle and then as a single bento, mirroring how
/// documents are authored. A single bento without a name lands under the
/// key `"default"`.
///
/// # Errors
///
/// Returns an error when the file cannot be read or its structure matches
/// neither document shape.
pub fn parse_bento_file(file_path: impl AsRef<Path>) -> Result<BentoBundle> {
    let file_path = file_path.as_ref();
    let content =
        fs::read_to_string(file_path).with_context(|| format!("failed to read bento file: {}", file_path.display()))?;

    // Attempt the multi-bento shape first so multi documents are never
    // accepted as single bentos with ignored fields.
    #[derive(Deserialize)]
    struct MultiBentoDocument {
        bentos: IndexMap<String, BentoSpec>,
    }

    if let Ok(document) = serde_yaml::from_str::<MultiBentoDocument>(&content) {
        return Ok(BentoBundle {
            bentos: document.bentos,
        });
    }

    if let Ok(spec) = serde_yaml::from_str::<BentoSpec>(&content) {
        let name = spec.bento.clone().unwrap_or_else(|| "default".to_string());
        let mut bentos = IndexMap::new();
        bentos.insert(name, spec);
        return Ok(BentoBundle { bentos });
    }

    anyhow::bail!(
        "unsupported bento document format. Expected one of:\n\
         - a single bento with 'bento' and 'root' fields\n\
         - a multi-bento document with bentos under a 'bentos' key\n\
         "
    );
}
