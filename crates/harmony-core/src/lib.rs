//! Envelope/message/script types, wire parsing and JSON canonicalization for
//! the harmony session execution engine (spec.md §1–§3, §4.1–§4.2).

pub mod canon;
pub mod cimap;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod model;
pub mod wire;

pub use canon::{from_canonical_json, to_canonical_json, SchemaValidator, StructuralValidator};
pub use cimap::CiMap;
pub use collaborators::{
    default_chat_filter, ChatError, ChatHistoryEntry, ChatService, ToolAvailability, ToolError,
    ToolService,
};
pub use config::{EngineConfig, PagingConfig, StoreConfig, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use error::{ParseError, ParseResult, SchemaError};
pub use model::{
    ArgMap, Channel, ContentType, Envelope, Message, Role, Script, ScriptId, Step, Termination,
};
