//! kshop-reconciler — watches a mailbox for KShop payment report mail,
//! extracts the attached CSV, and reconciles the listed orders against
//! the store's accounting service over SOAP.

pub mod config;
pub mod error;
pub mod mailbox;
pub mod pipeline;
pub mod rpc;
