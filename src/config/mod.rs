pub mod applicator;
pub mod loader;
pub mod schema;

pub use applicator::{
    apply_patches, build_jobs, build_operation, check_patches, ApplicationError, PatchStatus,
};
pub use loader::{discover_patch_files, load_from_path, load_from_str, ConfigError};
pub use schema::{
    AnchorSpec, Metadata, OccurrenceSpec, OperationSpec, PatchConfig, PatchDefinition,
    ValidationError, ValidationIssue, Verify,
};
