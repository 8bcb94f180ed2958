//! End-to-end calls over the in-process channel: a client on one side, a
//! served endpoint on the other, with replies correlated across concurrent
//! and misordered traffic.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use tabwise_rpc::{
    CallError, Client, ClientConfig, Dispatcher, InProcessChannel, MessageChannel, Operation,
    Route, RouterBuilder, schema, spawn_endpoint,
};
use tabwise_wire::ResponseEnvelope;

struct Greet;

impl Operation for Greet {
    const PATH: &'static str = "greet";
    type Input = String;
    type Output = String;
}

#[derive(Debug, Serialize, Deserialize)]
struct AddInput {
    a: i64,
    b: i64,
}

struct Add;

impl Operation for Add {
    const PATH: &'static str = "math.add";
    type Input = AddInput;
    type Output = i64;
}

/// Same path as [`Add`] but a skewed input shape, as a stale caller build
/// would produce. The wire carries no types, so only the receiving schema
/// catches this.
#[derive(Debug, Serialize, Deserialize)]
struct SkewedAddInput {
    a: String,
    b: i64,
}

struct SkewedAdd;

impl Operation for SkewedAdd {
    const PATH: &'static str = "math.add";
    type Input = SkewedAddInput;
    type Output = i64;
}

struct Explode;

impl Operation for Explode {
    const PATH: &'static str = "explode";
    type Input = String;
    type Output = String;
}

struct Farewell;

impl Operation for Farewell {
    const PATH: &'static str = "farewell";
    type Input = String;
    type Output = String;
}

fn test_dispatcher() -> Arc<Dispatcher<()>> {
    let router = RouterBuilder::new()
        .operation::<Greet, _, _>(schema::text, |name, _ctx| {
            // Longer names sleep longer, shuffling reply order under load.
            thread::sleep(Duration::from_millis(name.len() as u64 * 3));
            Ok(format!("Hello {name}"))
        })
        .nest(
            "math",
            RouterBuilder::new().route(
                "add",
                Route::new(
                    |value: &Value| {
                        let mut fields = schema::object(value)?;
                        let a = fields.required_i64("a");
                        let b = fields.required_i64("b");
                        fields.finish()?;
                        Ok(AddInput { a, b })
                    },
                    |input: AddInput, _ctx: &()| Ok(input.a + input.b),
                ),
            ),
        )
        .operation::<Explode, _, _>(schema::text, |_name, _ctx| {
            Err(tabwise_rpc::HandlerError::new("handler exploded"))
        })
        .build()
        .expect("build test router");
    Arc::new(Dispatcher::new(router))
}

struct Harness {
    channel: Arc<InProcessChannel>,
    client: Client,
    tab: tabwise_rpc::TabId,
    endpoint: Option<tabwise_rpc::EndpointHandle>,
}

impl Harness {
    fn serving() -> Self {
        let channel = Arc::new(InProcessChannel::new());
        let (tab, inbox) = channel.attach_tab();
        let endpoint = spawn_endpoint(inbox, test_dispatcher(), Arc::new(()));
        let client = Client::with_config(
            Arc::clone(&channel) as Arc<dyn tabwise_rpc::MessageChannel>,
            ClientConfig {
                call_timeout: Duration::from_secs(5),
            },
        );
        Self {
            channel,
            client,
            tab,
            endpoint: Some(endpoint),
        }
    }

    fn shutdown(mut self) {
        self.channel.detach_tab(self.tab);
        if let Some(endpoint) = self.endpoint.take() {
            endpoint.join();
        }
    }
}

#[test]
fn typed_call_resolves_with_handler_output() {
    let harness = Harness::serving();
    let greeting = harness.client.call::<Greet>(&"Sam".to_owned()).expect("call");
    assert_eq!(greeting, "Hello Sam");

    let sum = harness.client.call::<Add>(&AddInput { a: 2, b: 3 }).expect("call");
    assert_eq!(sum, 5);
    harness.shutdown();
}

#[test]
fn unknown_route_rejects_with_not_found_envelope() {
    let harness = Harness::serving();
    let error = harness
        .client
        .call::<Farewell>(&"Sam".to_owned())
        .expect_err("no such route");
    match error.rejection() {
        Some(ResponseEnvelope::NotFound { message, .. }) => {
            assert!(message.contains("farewell"));
        }
        other => panic!("expected NotFound rejection, got {other:?}"),
    }
    harness.shutdown();
}

#[test]
fn skewed_input_rejects_with_issue_list() {
    let harness = Harness::serving();
    let error = harness
        .client
        .call::<SkewedAdd>(&SkewedAddInput {
            a: "x".to_owned(),
            b: 2,
        })
        .expect_err("schema must reject");
    match error.rejection() {
        Some(ResponseEnvelope::InvalidInput { issues, .. }) => {
            assert!(issues.iter().any(|issue| issue.path == "a"));
        }
        other => panic!("expected InvalidInput rejection, got {other:?}"),
    }
    harness.shutdown();
}

#[test]
fn handler_failure_rejects_with_full_envelope() {
    let harness = Harness::serving();
    let error = harness
        .client
        .call::<Explode>(&"now".to_owned())
        .expect_err("handler fails");
    match error.rejection() {
        Some(ResponseEnvelope::Failed { error, .. }) => {
            assert_eq!(error["message"], "handler exploded");
        }
        other => panic!("expected Failed rejection, got {other:?}"),
    }
    harness.shutdown();
}

#[test]
fn call_without_destination_fails_at_channel_level() {
    let channel: Arc<dyn tabwise_rpc::MessageChannel> = Arc::new(InProcessChannel::new());
    let client = Client::new(channel);
    let error = client.call::<Greet>(&"Sam".to_owned()).expect_err("no tab");
    assert!(matches!(error, CallError::Channel(_)));
    assert!(error.rejection().is_none(), "channel failures carry no envelope");
}

#[test]
fn unserved_destination_times_out() {
    let channel = Arc::new(InProcessChannel::new());
    // Attached but never served: the inbox buffers the frame and no reply
    // ever comes back.
    let (_tab, _inbox) = channel.attach_tab();
    let client = Client::with_config(
        Arc::clone(&channel) as Arc<dyn tabwise_rpc::MessageChannel>,
        ClientConfig {
            call_timeout: Duration::from_millis(50),
        },
    );
    let error = client.call::<Greet>(&"Sam".to_owned()).expect_err("timeout");
    assert!(matches!(error, CallError::TimedOut { .. }));
}

#[test]
fn concurrent_calls_resolve_their_own_replies() {
    let harness = Harness::serving();
    let names = ["Ada", "Grace", "Alan", "Edsger", "Barbara", "Donald", "Tony", "Radia"];

    thread::scope(|scope| {
        let client = &harness.client;
        for name in names {
            scope.spawn(move || {
                let greeting = client.call::<Greet>(&name.to_owned()).expect("call");
                assert_eq!(greeting, format!("Hello {name}"));
            });
        }
    });

    harness.shutdown();
}

#[test]
fn mixed_outcomes_do_not_cross_correlate() {
    let harness = Harness::serving();
    thread::scope(|scope| {
        let client = &harness.client;
        scope.spawn(move || {
            let sum = client.call::<Add>(&AddInput { a: 40, b: 2 }).expect("sum");
            assert_eq!(sum, 42);
        });
        scope.spawn(move || {
            let error = client
                .call::<Explode>(&"boom".to_owned())
                .expect_err("failure");
            assert!(matches!(
                error.rejection(),
                Some(ResponseEnvelope::Failed { .. })
            ));
        });
        scope.spawn(move || {
            let greeting = client.call::<Greet>(&"Sam".to_owned()).expect("greet");
            assert_eq!(greeting, "Hello Sam");
        });
    });
    harness.shutdown();
}

#[test]
fn payload_type_mismatch_is_a_decode_error() {
    struct WrongOutput;

    impl Operation for WrongOutput {
        const PATH: &'static str = "greet";
        type Input = String;
        type Output = i64;
    }

    let harness = Harness::serving();
    let error = harness
        .client
        .call::<WrongOutput>(&"Sam".to_owned())
        .expect_err("string payload cannot become i64");
    assert!(matches!(error, CallError::DecodePayload(_)));
    harness.shutdown();
}

#[test]
fn unrelated_channel_traffic_does_not_disturb_calls() {
    let harness = Harness::serving();
    let (reply_to, _replies) = std::sync::mpsc::channel();
    harness
        .channel
        .send(harness.tab, json!({ "action": "getBody" }), reply_to)
        .expect("send unrelated");
    let greeting = harness.client.call::<Greet>(&"Sam".to_owned()).expect("call");
    assert_eq!(greeting, "Hello Sam");
    harness.shutdown();
}
