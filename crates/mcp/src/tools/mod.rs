pub mod channels;
pub mod forms;
pub mod leads;
mod registry;
pub mod smart_lists;
pub mod static_lists;

pub use channels::{
    CreateChannelTool, DeleteChannelTool, GetChannelByIdTool, GetChannelsTool, UpdateChannelTool,
};
pub use forms::{ApproveFormTool, CloneFormTool, GetFormByIdTool, GetFormsTool};
pub use leads::{DescribeLeadsTool, GetLeadByIdTool, GetLeadsTool, SyncLeadsTool};
pub use registry::{
    json_schema_array, json_schema_enum, json_schema_number, json_schema_object,
    json_schema_string, Tool, ToolRegistry,
};
pub use smart_lists::{GetSmartListByIdTool, GetSmartListsTool};
pub use static_lists::{
    AddLeadsToListTool, GetListByIdTool, GetListLeadsTool, GetListsTool, RemoveLeadsFromListTool,
};

use crate::protocol::CallToolResult;
use anyhow::{Context, Result};
use marketo_sdk::{ApiRequest, MarketoClient};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Page size used by the asset listing tools when none is given.
pub const DEFAULT_MAX_RETURN: u32 = 200;

/// Register every Marketo tool against one shared client.
pub fn register_all(registry: &mut ToolRegistry, client: &MarketoClient) {
    // Forms
    registry.register(Arc::new(GetFormsTool::new(client.clone())));
    registry.register(Arc::new(GetFormByIdTool::new(client.clone())));
    registry.register(Arc::new(ApproveFormTool::new(client.clone())));
    registry.register(Arc::new(CloneFormTool::new(client.clone())));

    // Channels
    registry.register(Arc::new(GetChannelsTool::new(client.clone())));
    registry.register(Arc::new(GetChannelByIdTool::new(client.clone())));
    registry.register(Arc::new(CreateChannelTool::new(client.clone())));
    registry.register(Arc::new(UpdateChannelTool::new(client.clone())));
    registry.register(Arc::new(DeleteChannelTool::new(client.clone())));

    // Smart lists
    registry.register(Arc::new(GetSmartListsTool::new(client.clone())));
    registry.register(Arc::new(GetSmartListByIdTool::new(client.clone())));

    // Leads
    registry.register(Arc::new(GetLeadsTool::new(client.clone())));
    registry.register(Arc::new(GetLeadByIdTool::new(client.clone())));
    registry.register(Arc::new(DescribeLeadsTool::new(client.clone())));
    registry.register(Arc::new(SyncLeadsTool::new(client.clone())));

    // Static lists
    registry.register(Arc::new(GetListsTool::new(client.clone())));
    registry.register(Arc::new(GetListByIdTool::new(client.clone())));
    registry.register(Arc::new(GetListLeadsTool::new(client.clone())));
    registry.register(Arc::new(AddLeadsToListTool::new(client.clone())));
    registry.register(Arc::new(RemoveLeadsFromListTool::new(client.clone())));
}

/// Deserialize tool arguments, naming the tool in the error.
pub(crate) fn parse_args<T: DeserializeOwned>(tool: &str, arguments: serde_json::Value) -> Result<T> {
    serde_json::from_value(arguments).with_context(|| format!("Invalid arguments for {}", tool))
}

/// Append the present query parameters to `path`.
pub(crate) fn with_query(path: &str, params: &[(&str, Option<String>)]) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    let mut any = false;
    for (key, value) in params {
        if let Some(value) = value {
            query.append_pair(key, value);
            any = true;
        }
    }

    if any {
        format!("{}?{}", path, query.finish())
    } else {
        path.to_string()
    }
}

/// Run the request and present the upstream body as pretty-printed JSON.
pub(crate) async fn relay(client: &MarketoClient, request: ApiRequest) -> CallToolResult {
    match client.request(request).await {
        Ok(body) => match serde_json::to_string_pretty(&body) {
            Ok(text) => CallToolResult::text(text),
            Err(e) => CallToolResult::error(e.to_string()),
        },
        Err(e) => CallToolResult::error(e.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::protocol::CallToolResult;
    use marketo_sdk::MarketoClient;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Mock Marketo instance with a working identity endpoint, plus a client
    /// pointed at its `/rest` base.
    pub(crate) async fn marketo_server() -> (MockServer, MarketoClient) {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/identity/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "test-token",
                "token_type": "bearer",
                "expires_in": 3600,
                "scope": "api@example.com"
            })))
            .mount(&server)
            .await;

        let client = MarketoClient::builder()
            .base_url(format!("{}/rest", server.uri()))
            .client_id("client-id")
            .client_secret("client-secret")
            .build()
            .unwrap();

        (server, client)
    }

    pub(crate) fn ok_body() -> serde_json::Value {
        json!({"success": true, "result": []})
    }

    pub(crate) fn text(result: &CallToolResult) -> &str {
        result.content[0].as_text()
    }
}
