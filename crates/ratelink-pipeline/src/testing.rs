use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use ratelink_core::{Candidate, Lookup, LookupError, LookupResponse};
use serde_json::json;

enum Canned {
    Found(Vec<Candidate>),
    Unparsable,
    Fail,
}

/// Scripted lookup that records every call. Unscripted queries find nothing.
#[derive(Default)]
pub struct FakeLookup {
    canned: HashMap<(String, String), Canned>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeLookup {
    pub fn respond(mut self, name: &str, postcode: &str, found: Vec<Candidate>) -> Self {
        self.canned.insert(key(name, postcode), Canned::Found(found));
        self
    }

    pub fn unparsable(mut self, name: &str, postcode: &str) -> Self {
        self.canned.insert(key(name, postcode), Canned::Unparsable);
        self
    }

    pub fn fail_on(mut self, name: &str, postcode: &str) -> Self {
        self.canned.insert(key(name, postcode), Canned::Fail);
        self
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

fn key(name: &str, postcode: &str) -> (String, String) {
    (name.to_string(), postcode.to_string())
}

#[async_trait]
impl Lookup for FakeLookup {
    async fn lookup(&self, name: &str, postcode: &str) -> Result<LookupResponse, LookupError> {
        self.calls.lock().unwrap().push(key(name, postcode));
        match self.canned.get(&key(name, postcode)) {
            Some(Canned::Found(found)) => Ok(LookupResponse::Establishments(found.clone())),
            Some(Canned::Unparsable) => Ok(LookupResponse::Unparsable("expected value".into())),
            Some(Canned::Fail) => Err(LookupError::transport(std::io::Error::other(
                "connection reset",
            ))),
            None => Ok(LookupResponse::Establishments(Vec::new())),
        }
    }
}

pub fn establishment(name: &str, postcode: &str) -> Candidate {
    Candidate::from_value(json!({"BusinessName": name, "PostCode": postcode})).unwrap()
}
