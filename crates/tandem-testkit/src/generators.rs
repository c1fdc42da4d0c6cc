//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::json;

use tandem_core::Action;
use tandem_store::LogExt;
use tandem_sync::{Connection, Result};

use crate::fixtures::SyncPair;

/// Generate an action type name.
pub fn action_type() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,7}".prop_map(String::from)
}

/// Generate an action: a `type` and optionally a number or text payload.
pub fn action() -> impl Strategy<Value = Action> {
    (
        action_type(),
        prop_oneof![
            Just(None),
            any::<i64>().prop_map(|n| Some(json!(n))),
            "[ -~]{0,16}".prop_map(|s| Some(json!(s))),
        ],
    )
        .prop_map(|(kind, value)| {
            let payload = match value {
                Some(value) => json!({ "type": kind, "value": value }),
                None => json!({ "type": kind }),
            };
            Action::try_from(payload).unwrap_or_else(|_| Action::of_type(&kind))
        })
}

/// One step of a replication scenario.
#[derive(Debug, Clone)]
pub enum Op {
    /// Append on the client log.
    ClientAdd(Action),
    /// Append on the server log.
    ServerAdd(Action),
    /// Let both engines process everything queued so far.
    Settle,
    /// Close the connection.
    Disconnect,
    /// Reopen the connection.
    Reconnect,
}

/// Generate a single operation, weighted towards appends.
pub fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => action().prop_map(Op::ClientAdd),
        4 => action().prop_map(Op::ServerAdd),
        2 => Just(Op::Settle),
        1 => Just(Op::Disconnect),
        1 => Just(Op::Reconnect),
    ]
}

/// Generate a scenario of up to `max_len` operations.
pub fn ops(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op(), 0..=max_len)
}

/// Number of appends in a scenario.
pub fn add_count(ops: &[Op]) -> usize {
    ops.iter()
        .filter(|op| matches!(op, Op::ClientAdd(_) | Op::ServerAdd(_)))
        .count()
}

/// Replay `ops` against a fresh [`SyncPair`], then reconnect and settle.
pub async fn replay(ops: &[Op]) -> Result<SyncPair> {
    let test = SyncPair::connected().await?;

    for op in ops {
        match op {
            Op::ClientAdd(action) => {
                test.client_log.add(action.clone()).await?;
            }
            Op::ServerAdd(action) => {
                test.server_log.add(action.clone()).await?;
            }
            Op::Settle => test.settle().await,
            Op::Disconnect => test.left().disconnect().await,
            Op::Reconnect => test.left().connect().await?,
        }
    }

    test.left().connect().await?;
    test.settle().await;
    Ok(test)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_sync::verify_convergence;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn test_generated_actions_are_objects(action in action()) {
            prop_assert!(action.as_value().is_object());
            prop_assert!(action.action_type().is_some());
        }

        #[test]
        fn test_interleavings_converge(ops in ops(24)) {
            let expected = add_count(&ops);
            runtime().block_on(async {
                let test = replay(&ops).await.unwrap();

                let client = test.client_log.actions().await.unwrap();
                let server = test.server_log.actions().await.unwrap();
                prop_assert_eq!(client.len(), expected);
                prop_assert_eq!(&client, &server);
                prop_assert!(verify_convergence(&*test.client_log, &*test.server_log)
                    .await
                    .unwrap()
                    .is_converged());

                let client_status = test.client.status();
                let server_status = test.server.status();
                prop_assert_eq!(client_status.other_synced, server_status.synced);
                prop_assert_eq!(server_status.other_synced, client_status.synced);
                Ok(())
            })?;
        }
    }
}
