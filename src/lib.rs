//! # HPE SimpliVity / OmniStack Management
//!
//! Declarative management of an HPE SimpliVity federation via the OmniStack
//! REST API: structural state comparison, present/absent reconciliation, and
//! typed operations for VMs, backups, datastores, policies, hosts, and
//! clusters.
//!
//! ## Modules
//!
//! - **types** — Shared wire shapes (resources, tasks, query parameters)
//! - **error** — Crate-specific error types
//! - **config** — OVC endpoint and credential configuration
//! - **compare** — Structural equivalence between desired and live state
//! - **state** — Present/absent reconciliation over a `ResourceStore`
//! - **ovc** — OmniStack REST API HTTP client with OAuth2 auth and task polling
//! - **vm** — Virtual machine lookup, clone, move, backup, policy assignment
//! - **backup** — Backup lookup, delete, rename, lock
//! - **policy** — Backup policy CRUD and VM listing
//! - **datastore** — Datastore CRUD and resize
//! - **host** — Host lookup and federation removal
//! - **cluster** — OmniStack cluster lookup and time zones
//! - **facts** — Read-only fact gathering per resource kind
//! - **service** — Aggregate facade owning the connected client

pub mod types;
pub mod error;
pub mod config;
pub mod compare;
pub mod state;
pub mod ovc;
pub mod vm;
pub mod backup;
pub mod policy;
pub mod datastore;
pub mod host;
pub mod cluster;
pub mod facts;
pub mod service;
