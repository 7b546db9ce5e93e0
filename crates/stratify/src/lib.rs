//! stratify - generic file-tree indexing and querying
//!
//! Entities are named attributes extracted from file paths by regex (or by a
//! registered [`EntityMapper`]), grouped into domains loaded from JSON
//! configs. A [`Layout`] indexes one or more roots, then answers structured
//! queries with file, tuple, id and directory projections, resolves the
//! nearest matching file up the directory tree, and builds new paths from
//! entity values via templates.

pub mod layout;
pub mod logging;
pub mod natural;
pub mod template;
pub mod writer;

pub use layout::config::{DomainConfig, EntityConfig, RootSpec};
pub use layout::entity::{Dtype, Entity, EntityMapper, TagValue};
pub use layout::error::{LayoutError, Result};
pub use layout::file::{FileRecord, Tag};
pub use layout::nearest::NearestOptions;
pub use layout::query::{FilterValue, Projection, Query, QueryRecord, QueryResult};
pub use layout::source::{FileSource, LocalFileSource};
pub use layout::{Layout, LayoutBuilder, DEFAULT_CONFIG_FILENAME};
pub use template::build_path;
pub use writer::{write_contents_to_file, ConflictPolicy, WriteSource};
