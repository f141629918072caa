/// Direct message threads between an account and one peer
use crate::{
    context::ClientContext,
    error::{ClientError, ClientResult},
    resource::{Resource, ResourceSnapshot, ResourceState},
    settings::{self, names},
};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Account holding a thread; threads are always account-scoped
fn holder(resource: &Resource) -> ClientResult<&str> {
    resource
        .key()
        .owner
        .as_deref()
        .ok_or_else(|| ClientError::InvalidSetting {
            name: "directmessages".to_string(),
            reason: format!("{} is not held by an account", resource.key()),
        })
}

async fn query(ctx: &ClientContext, resource: &Arc<Resource>, bound: (&str, Option<u64>)) -> ClientResult<Vec<Value>> {
    let account = holder(resource)?;
    let page_size = resource.setting(ctx, names::PAGE_SIZE).await?;
    let page_size = settings::as_u64(names::PAGE_SIZE, &page_size)?;

    let mut filter = Map::new();
    filter.insert("username".to_string(), Value::from(resource.name()));
    if let (bound_name, Some(id)) = bound {
        filter.insert(bound_name.to_string(), Value::from(id));
    }

    let result = ctx
        .rpc(
            resource,
            "getdirectmsgs",
            vec![Value::from(account), Value::from(page_size), json!([filter])],
        )
        .await?;

    match result {
        Value::Object(mut threads) => match threads.remove(resource.name()) {
            Some(Value::Array(messages)) => Ok(messages),
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(other) => Err(ClientError::MalformedResponse(format!(
                "getdirectmsgs returned a non-array thread: {}",
                other
            ))),
        },
        other => Err(ClientError::MalformedResponse(format!(
            "getdirectmsgs returned a non-object result: {}",
            other
        ))),
    }
}

pub(crate) async fn fetch(ctx: &ClientContext, resource: &Arc<Resource>) -> ClientResult<()> {
    let since_id = resource.state.read().await.latest_id;
    let messages = query(ctx, resource, ("since_id", since_id)).await?;

    let mut state = resource.state.write().await;
    merge_messages(&mut state, messages);
    state.mark_fresh(ctx.now());
    Ok(())
}

pub(crate) async fn fetch_until(ctx: &ClientContext, resource: &Arc<Resource>, max_id: u64) -> ClientResult<()> {
    let messages = query(ctx, resource, ("max_id", Some(max_id))).await?;

    let mut state = resource.state.write().await;
    merge_messages(&mut state, messages);
    Ok(())
}

fn message_id(message: &Value) -> Option<u64> {
    message.get("id").and_then(Value::as_u64)
}

fn merge_messages(state: &mut ResourceState, messages: Vec<Value>) {
    let merged = super::merge_items(&mut state.data, messages, message_id);
    state.latest_id = super::newest_id(state.latest_id, merged);
}

/// Read-only view of a delivered thread
#[derive(Debug, Clone)]
pub struct DirectMessageThread<'a>(&'a ResourceSnapshot);

impl<'a> DirectMessageThread<'a> {
    pub fn new(snapshot: &'a ResourceSnapshot) -> Self {
        Self(snapshot)
    }

    pub fn peer(&self) -> &str {
        &self.0.name
    }

    pub fn latest_id(&self) -> Option<u64> {
        self.0.latest_id
    }

    /// Messages held, oldest first
    pub fn messages(&self) -> &[Value] {
        self.0.data.as_array().map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_messages_tracks_latest() {
        let mut state = ResourceState::default();

        merge_messages(
            &mut state,
            vec![json!({"id": 2, "text": "b", "fromMe": false}), json!({"id": 1, "text": "a", "fromMe": true})],
        );
        assert_eq!(state.latest_id, Some(2));

        let snapshot = ResourceSnapshot {
            data: state.data,
            latest_id: state.latest_id,
            ..ResourceSnapshot::placeholder("bob")
        };
        let thread = DirectMessageThread::new(&snapshot);
        assert_eq!(thread.messages()[0]["text"], "a");
        assert_eq!(thread.peer(), "bob");
    }
}
