//! High-level API
//!
//! [`ObjectRemover`] is the async library entry point; [`ObjectRemoverPlugin`]
//! wraps it in the `removeObject` message boundary a host application talks to.

pub mod object_remover;
pub mod plugin;

pub use object_remover::ObjectRemover;
pub use plugin::{
    ArgumentValue, MethodCall, MethodCallHandler, MethodResponse, ObjectRemoverPlugin,
    RemoveObjectResponse, REGION_ARGUMENT, REMOVE_OBJECT_METHOD,
};
