//! Third-party credentials (spec.md §6 `credentials/<service>/<uid>`):
//! opaque per-service auth material for silo backends that talk to an
//! external store, analogous to the original source's per-backend silo
//! implementations (e.g. a Dropbox-backed silo) needing an OAuth token at
//! rest. Stored like `UserIdentity`, with `registry::save_json_private`.

use serde_derive::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Credentials {
    pub service: String,
    pub uid: String,
    pub payload: serde_json::Value,
}

impl Credentials {
    pub fn new(service: impl Into<String>, uid: impl Into<String>, payload: serde_json::Value) -> Self {
        Credentials {
            service: service.into(),
            uid: uid.into(),
            payload,
        }
    }
}
