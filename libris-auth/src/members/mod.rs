//! Member Management Module
//!
//! Library patron and staff records behind an injected repository, with every
//! mutation checked against the role policy.

pub mod service;
pub mod storage;
pub mod types;

pub use service::MemberService;
pub use storage::{MemberRepository, InMemoryMemberRepository};
pub use types::*;
