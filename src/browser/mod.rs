//! Browser automation module
//!
//! This module provides the capture pipeline's view of a browser: a
//! capability-based [`PageDriver`] trait, a ChromiumOxide (CDP) implementation
//! of it, and a factory used to recreate sessions after fatal driver errors.

pub mod driver;
pub mod session;

pub use driver::{PageDriver, SessionFactory};
pub use session::{CdpSession, CdpSessionFactory, SessionConfig, SessionConfigBuilder};
