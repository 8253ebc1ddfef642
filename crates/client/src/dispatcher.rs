//! Event dispatcher — routes decoded server packets to subscribers.
//!
//! Auth replies and heartbeat replies go to every subscriber. Message
//! replies are routed by their `cmd` field:
//!
//! | subscriber filter                  | invoked with tag | consumed |
//! |------------------------------------|------------------|----------|
//! | none                               | `ALL`            | yes      |
//! | contains `cmd`                     | `cmd`            | yes, marks a hit |
//! | contains `ALL`                     | `ALL`            | yes      |
//! | no `OTHERS`                        | —                | yes      |
//! | contains `OTHERS` only             | deferred         | no       |
//!
//! Deferred subscribers fire with tag `OTHERS` only when no subscriber
//! matched `cmd` exactly.

use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use ol_domain::ProtocolError;
use ol_protocol::{ServerMessage, ServerOperation};
use parking_lot::RwLock;

/// Filter token matching every command.
pub const ALL: &str = "ALL";
/// Filter token matching commands no other subscriber claimed.
pub const OTHERS: &str = "OTHERS";

/// One routed message-reply.
#[derive(Debug, Clone, Copy)]
pub struct MessageEvent<'a> {
    /// Routing key taken from the body.
    pub cmd: &'a str,
    /// Why this subscriber fired: `cmd` itself, [`ALL`] or [`OTHERS`].
    pub tag: &'a str,
    pub json: &'a serde_json::Value,
    pub raw: &'a [u8],
}

type AuthReplyHandler = Arc<dyn Fn(&serde_json::Value, &[u8]) + Send + Sync>;
type HeartbeatReplyHandler = Arc<dyn Fn(i32, &[u8]) + Send + Sync>;
type MessageHandler = Arc<dyn Fn(&MessageEvent<'_>) + Send + Sync>;

#[derive(Clone)]
struct MessageSubscription {
    handler: MessageHandler,
    /// `None` means unconditional.
    filter: Option<BTreeSet<String>>,
}

/// Ordered subscriber lists for the three server operations.
///
/// Subscribing is allowed at any time, including from inside a handler:
/// dispatch works on a snapshot of the lists.
#[derive(Default)]
pub struct EventDispatcher {
    auth_reply: RwLock<Vec<AuthReplyHandler>>,
    heartbeat_reply: RwLock<Vec<HeartbeatReplyHandler>>,
    message_reply: RwLock<Vec<MessageSubscription>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("auth_reply", &self.auth_reply.read().len())
            .field("heartbeat_reply", &self.heartbeat_reply.read().len())
            .field("message_reply", &self.message_reply.read().len())
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Subscription ─────────────────────────────────────────────────

    /// Subscribe to auth replies: `(decoded json, raw body)`.
    pub fn on_auth_reply<F>(&self, f: F) -> &Self
    where
        F: Fn(&serde_json::Value, &[u8]) + Send + Sync + 'static,
    {
        self.auth_reply.write().push(Arc::new(f));
        self
    }

    /// Subscribe to heartbeat replies: `(popularity, raw body)`.
    pub fn on_heartbeat_reply<F>(&self, f: F) -> &Self
    where
        F: Fn(i32, &[u8]) + Send + Sync + 'static,
    {
        self.heartbeat_reply.write().push(Arc::new(f));
        self
    }

    /// Subscribe to every message reply (no filter, tag is always [`ALL`]).
    pub fn on_message<F>(&self, f: F) -> &Self
    where
        F: Fn(&MessageEvent<'_>) + Send + Sync + 'static,
    {
        self.push_message(None, Arc::new(f))
    }

    /// Subscribe to message replies whose `cmd` is in `commands`.
    ///
    /// `commands` may include the reserved tokens [`ALL`] and [`OTHERS`].
    pub fn on_commands<I, S, F>(&self, commands: I, f: F) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&MessageEvent<'_>) + Send + Sync + 'static,
    {
        let filter = commands.into_iter().map(Into::into).collect();
        self.push_message(Some(filter), Arc::new(f))
    }

    fn push_message(&self, filter: Option<BTreeSet<String>>, handler: MessageHandler) -> &Self {
        self.message_reply
            .write()
            .push(MessageSubscription { handler, filter });
        self
    }

    /// Number of message-reply subscriptions.
    pub fn message_subscriber_count(&self) -> usize {
        self.message_reply.read().len()
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Interpret `body` for `op` and invoke the matching subscribers.
    ///
    /// Runs synchronously: every handler has returned when this does.
    pub fn dispatch(&self, op: ServerOperation, body: &[u8]) -> Result<(), ProtocolError> {
        match ServerMessage::parse(op, body)? {
            ServerMessage::AuthReply(json) => {
                let handlers = self.auth_reply.read().clone();
                for h in &handlers {
                    guarded("auth_reply", || h(&json, body));
                }
            }
            ServerMessage::HeartbeatReply(popularity) => {
                let handlers = self.heartbeat_reply.read().clone();
                for h in &handlers {
                    guarded("heartbeat_reply", || h(popularity, body));
                }
            }
            ServerMessage::MessageReply { cmd, json } => {
                self.dispatch_message(&cmd, &json, body);
            }
        }
        Ok(())
    }

    /// Route one message reply. Returns how many subscribers were invoked.
    pub fn dispatch_message(&self, cmd: &str, json: &serde_json::Value, raw: &[u8]) -> usize {
        let subs = self.message_reply.read().clone();
        let invoke = |sub: &MessageSubscription, tag: &str| {
            let ev = MessageEvent { cmd, tag, json, raw };
            guarded("message_reply", || (sub.handler)(&ev));
        };

        let mut invoked = 0;
        let mut hit = false;
        let mut pending = Vec::new();

        for sub in &subs {
            match &sub.filter {
                None => {
                    invoke(sub, ALL);
                    invoked += 1;
                }
                Some(filter) if filter.contains(cmd) => {
                    invoke(sub, cmd);
                    invoked += 1;
                    hit = true;
                }
                Some(filter) if filter.contains(ALL) => {
                    invoke(sub, ALL);
                    invoked += 1;
                }
                Some(filter) if !filter.contains(OTHERS) => {}
                Some(_) => pending.push(sub),
            }
        }

        if !hit {
            for sub in pending {
                invoke(sub, OTHERS);
                invoked += 1;
            }
        }

        tracing::trace!(cmd = %cmd, invoked, hit, "message dispatched");
        invoked
    }
}

/// A panicking subscriber must not take the receive loop down with it.
fn guarded(channel: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(channel = %channel, "event subscriber panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    type Log = Arc<Mutex<Vec<(String, String)>>>;

    fn recorder(
        log: &Log,
        name: &'static str,
    ) -> impl Fn(&MessageEvent<'_>) + Send + Sync + 'static {
        let log = log.clone();
        move |ev| log.lock().push((name.to_owned(), ev.tag.to_owned()))
    }

    fn dispatch_cmd(d: &EventDispatcher, cmd: &str) -> usize {
        d.dispatch_message(cmd, &json!({ "cmd": cmd }), b"")
    }

    #[test]
    fn precise_match_suppresses_others() {
        let log: Log = Default::default();
        let d = EventDispatcher::new();
        d.on_commands(["CMD1"], recorder(&log, "A"));
        d.on_commands([OTHERS], recorder(&log, "B"));
        d.on_message(recorder(&log, "C"));

        assert_eq!(dispatch_cmd(&d, "CMD1"), 2);
        assert_eq!(
            *log.lock(),
            vec![("A".into(), "CMD1".into()), ("C".into(), "ALL".into())]
        );
    }

    #[test]
    fn unmatched_command_falls_back_to_others() {
        let log: Log = Default::default();
        let d = EventDispatcher::new();
        d.on_commands(["CMD1"], recorder(&log, "A"));
        d.on_commands([OTHERS], recorder(&log, "B"));
        d.on_message(recorder(&log, "C"));

        assert_eq!(dispatch_cmd(&d, "CMD2"), 2);
        // Deferred subscribers run after the single pass.
        assert_eq!(
            *log.lock(),
            vec![("C".into(), "ALL".into()), ("B".into(), "OTHERS".into())]
        );
    }

    #[test]
    fn all_token_fires_with_all_tag() {
        let log: Log = Default::default();
        let d = EventDispatcher::new();
        d.on_commands(["X", ALL], recorder(&log, "A"));

        dispatch_cmd(&d, "Y");
        dispatch_cmd(&d, "X");
        assert_eq!(
            *log.lock(),
            vec![("A".into(), "ALL".into()), ("A".into(), "X".into())]
        );
    }

    #[test]
    fn all_match_does_not_suppress_others() {
        let log: Log = Default::default();
        let d = EventDispatcher::new();
        d.on_commands([ALL], recorder(&log, "A"));
        d.on_commands([OTHERS], recorder(&log, "B"));

        dispatch_cmd(&d, "Z");
        assert_eq!(
            *log.lock(),
            vec![("A".into(), "ALL".into()), ("B".into(), "OTHERS".into())]
        );
    }

    #[test]
    fn uninterested_filter_is_skipped() {
        let log: Log = Default::default();
        let d = EventDispatcher::new();
        d.on_commands(["A", "B"], recorder(&log, "AB"));
        assert_eq!(dispatch_cmd(&d, "C"), 0);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn specific_plus_others_in_one_filter() {
        let log: Log = Default::default();
        let d = EventDispatcher::new();
        d.on_commands(["DM", OTHERS], recorder(&log, "S"));

        dispatch_cmd(&d, "DM");
        dispatch_cmd(&d, "GIFT");
        assert_eq!(
            *log.lock(),
            vec![("S".into(), "DM".into()), ("S".into(), "OTHERS".into())]
        );
    }

    #[test]
    fn registration_order_is_preserved() {
        let log: Log = Default::default();
        let d = EventDispatcher::new();
        for name in ["1", "2", "3"] {
            d.on_message(recorder(&log, name));
        }
        dispatch_cmd(&d, "ANY");
        let names: Vec<String> = log.lock().iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, vec!["1", "2", "3"]);
    }

    #[test]
    fn panicking_subscriber_does_not_stop_dispatch() {
        let log: Log = Default::default();
        let d = EventDispatcher::new();
        d.on_message(|_| panic!("boom"));
        d.on_message(recorder(&log, "after"));
        assert_eq!(dispatch_cmd(&d, "X"), 2);
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn handler_may_subscribe_during_dispatch() {
        let d = Arc::new(EventDispatcher::new());
        let inner = d.clone();
        d.on_message(move |_| {
            inner.on_message(|_| {});
        });
        dispatch_cmd(&d, "X");
        assert_eq!(d.message_subscriber_count(), 2);
    }

    #[test]
    fn dispatch_routes_by_operation() {
        let auth: Arc<Mutex<Option<serde_json::Value>>> = Default::default();
        let popularity: Arc<Mutex<Option<i32>>> = Default::default();
        let d = EventDispatcher::new();
        {
            let auth = auth.clone();
            d.on_auth_reply(move |json, _| *auth.lock() = Some(json.clone()));
        }
        {
            let popularity = popularity.clone();
            d.on_heartbeat_reply(move |p, raw| {
                assert_eq!(raw.len(), 4);
                *popularity.lock() = Some(p);
            });
        }

        d.dispatch(ServerOperation::AuthReply, br#"{"code":0}"#).unwrap();
        d.dispatch(ServerOperation::HeartbeatReply, &[0, 0, 0, 7]).unwrap();

        assert_eq!(*auth.lock(), Some(json!({"code": 0})));
        assert_eq!(*popularity.lock(), Some(7));
    }

    #[test]
    fn dispatch_surfaces_malformed_bodies() {
        let d = EventDispatcher::new();
        assert!(d.dispatch(ServerOperation::HeartbeatReply, &[1, 2, 3]).is_err());
        assert!(d.dispatch(ServerOperation::MessageReply, b"{").is_err());
    }

    #[test]
    fn message_dispatch_passes_raw_body_and_json() {
        let seen: Arc<Mutex<Vec<(String, Vec<u8>)>>> = Default::default();
        let d = EventDispatcher::new();
        {
            let seen = seen.clone();
            d.on_commands(["LIVE_OPEN_PLATFORM_DM"], move |ev| {
                assert_eq!(ev.json["data"]["msg"], "hi");
                seen.lock().push((ev.cmd.to_owned(), ev.raw.to_vec()));
            });
        }
        let body = br#"{"cmd":"LIVE_OPEN_PLATFORM_DM","data":{"msg":"hi"}}"#;
        d.dispatch(ServerOperation::MessageReply, body).unwrap();
        assert_eq!(
            *seen.lock(),
            vec![("LIVE_OPEN_PLATFORM_DM".to_owned(), body.to_vec())]
        );
    }
}
