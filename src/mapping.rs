//! Extension seams between command classification and fan-out.
//!
//! Partitioning lives behind these two traits: a [`QueryMapper`] decides
//! whether and how SQL text is rewritten before it goes out, and a
//! [`DelegateSelector`] decides which delegates receive the command. The
//! shipped implementations keep every query untouched and use every
//! delegate, which makes the proxy a plain fan-out.

use auto_impl::auto_impl;

use crate::driver::{DelegateId, Disposition};

/// Inspects and optionally rewrites the SQL of each COM_QUERY before it is
/// delegated.
#[auto_impl(&mut, Box)]
pub trait QueryMapper {
    /// Does this statement touch a partitioned table?
    fn requires_mapping(&self, sql: &str) -> bool;

    /// A replacement statement, or `None` to forward the original.
    fn rewrite(&mut self, sql: &str) -> Option<String>;
}

/// Picks the delegates that take part in one command round.
#[auto_impl(&, Box)]
pub trait DelegateSelector {
    fn select(&self, id: DelegateId) -> Disposition;
}

/// Forwards every query untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl QueryMapper for Passthrough {
    fn requires_mapping(&self, _sql: &str) -> bool {
        false
    }

    fn rewrite(&mut self, _sql: &str) -> Option<String> {
        None
    }
}

/// Uses every configured delegate.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllDelegates;

impl DelegateSelector for AllDelegates {
    fn select(&self, _id: DelegateId) -> Disposition {
        Disposition::Use
    }
}
