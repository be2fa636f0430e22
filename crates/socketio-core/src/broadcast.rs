use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use crate::namespace::Namespace;

/// Builds a room/exclusion target set for one outgoing broadcast, then
/// fans it out exactly once (§4.D):
///
/// - `socket.to(r1).to(r2).except(x).emit(e, a)` unions `r1`/`r2`'s local
///   members, subtracts `x` and the caller itself.
/// - `socket.broadcast.emit(e, a)` excludes only the caller, over the
///   whole namespace.
/// - `namespace.to(r).emit(e, a)` excludes nobody.
pub struct BroadcastBuilder {
    namespace: Arc<Namespace>,
    rooms: Vec<String>,
    except: HashSet<String>,
    exclude_self: Option<String>,
}

impl BroadcastBuilder {
    pub(crate) fn new(namespace: Arc<Namespace>, exclude_self: Option<String>) -> Self {
        Self {
            namespace,
            rooms: Vec::new(),
            except: HashSet::new(),
            exclude_self,
        }
    }

    pub fn to(mut self, room: impl Into<String>) -> Self {
        self.rooms.push(room.into());
        self
    }

    pub fn except(mut self, sid: impl Into<String>) -> Self {
        self.except.insert(sid.into());
        self
    }

    pub async fn emit(self, event: &str, data: Option<Value>) {
        self.namespace
            .dispatch_broadcast(self.rooms, self.except, self.exclude_self, event, data)
            .await;
    }
}
