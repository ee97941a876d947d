//! Access control for write operations.

pub mod hierarchy;
pub mod policy;
pub mod tool_name;

pub use hierarchy::{CacheEntry, CacheStats, FolderHierarchy, FolderHierarchyCache, MAX_WALK_DEPTH};
pub use policy::{
    AccessControlError, AccessPolicyEvaluator, AccessRequest, DenialCode, Operation,
    WRITE_SERVICES,
};
pub use tool_name::{parse_tool_name, ParsedToolName, ToolNamePattern};
