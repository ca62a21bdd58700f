//! Client-side request attestation mediator: attach short-lived attestation tokens, swap
//! placeholder secrets for real ones, and keep a bounded retry policy around an opaque
//! attestation backend.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod config;
pub mod decision;
pub mod error;
pub mod fetch;
#[cfg(feature = "reqwest")] pub mod http;
pub mod obs;
pub mod pins;
pub mod request;
pub mod rules;
pub mod service;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, BTreeSet, HashMap},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::RwLock;
	#[cfg(feature = "reqwest")]
	pub use reqwest::Request as ReqwestRequest;
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use tokio_util::sync::CancellationToken;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use tokio_util::sync::CancellationToken;
pub use url;
#[cfg(test)] use httpmock as _;
