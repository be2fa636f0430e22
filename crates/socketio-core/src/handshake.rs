use std::collections::HashMap;

/// Immutable record captured at Engine.IO handshake time and reused for
/// every namespace a client connects to over that session. The source
/// ecosystem's handshake object is a freeform bag; we pin down a concrete
/// shape since Rust needs one, keeping only the fields middlewares and
/// admission actually look at (§3 SUPPLEMENT).
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    pub sid: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub url: String,
}

impl Handshake {
    pub fn new(sid: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            sid: sid.into(),
            query: HashMap::new(),
            headers: HashMap::new(),
            url: url.into(),
        }
    }

    pub fn with_query(mut self, query: HashMap<String, String>) -> Self {
        self.query = query;
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }
}
