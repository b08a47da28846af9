// Smart list tools (asset API)

use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::{
    json_schema_number, json_schema_object, parse_args, relay, with_query, Tool,
    DEFAULT_MAX_RETURN,
};
use anyhow::Result;
use marketo_sdk::{ApiRequest, MarketoClient};
use serde::Deserialize;
use serde_json::json;

/// Tool to browse smart lists
pub struct GetSmartListsTool {
    client: MarketoClient,
}

impl GetSmartListsTool {
    pub fn new(client: MarketoClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetSmartListsArgs {
    #[serde(default)]
    max_return: Option<u32>,
    #[serde(default)]
    offset: Option<u32>,
}

#[async_trait::async_trait]
impl Tool for GetSmartListsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "marketo_get_smart_lists".to_string(),
            description: "List Marketo smart lists".to_string(),
            input_schema: json_schema_object(
                json!({
                    "maxReturn": json_schema_number("Maximum number of smart lists to return (default: 200)"),
                    "offset": json_schema_number("Integer offset for paging (default: 0)")
                }),
                vec![],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: GetSmartListsArgs = parse_args("marketo_get_smart_lists", arguments)?;

        let endpoint = with_query(
            "/asset/v1/smartLists.json",
            &[
                ("maxReturn", Some(args.max_return.unwrap_or(DEFAULT_MAX_RETURN).to_string())),
                ("offset", Some(args.offset.unwrap_or(0).to_string())),
            ],
        );

        Ok(relay(&self.client, ApiRequest::get(endpoint)).await)
    }
}

/// Tool to get one smart list
pub struct GetSmartListByIdTool {
    client: MarketoClient,
}

impl GetSmartListByIdTool {
    pub fn new(client: MarketoClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SmartListIdArgs {
    smart_list_id: u64,
}

#[async_trait::async_trait]
impl Tool for GetSmartListByIdTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "marketo_get_smart_list_by_id".to_string(),
            description: "Get a Marketo smart list by its ID".to_string(),
            input_schema: json_schema_object(
                json!({
                    "smartListId": json_schema_number("ID of the smart list")
                }),
                vec!["smartListId"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: SmartListIdArgs = parse_args("marketo_get_smart_list_by_id", arguments)?;
        let endpoint = format!("/asset/v1/smartList/{}.json", args.smart_list_id);

        Ok(relay(&self.client, ApiRequest::get(endpoint)).await)
    }
}
