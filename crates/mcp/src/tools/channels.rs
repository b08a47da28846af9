// Channel tools (asset API)

use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::{
    json_schema_number, json_schema_object, json_schema_string, parse_args, relay, with_query,
    Tool, DEFAULT_MAX_RETURN,
};
use anyhow::Result;
use marketo_sdk::{ApiRequest, MarketoClient};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Tool to browse channels
pub struct GetChannelsTool {
    client: MarketoClient,
}

impl GetChannelsTool {
    pub fn new(client: MarketoClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageArgs {
    #[serde(default)]
    max_return: Option<u32>,
    #[serde(default)]
    offset: Option<u32>,
}

#[async_trait::async_trait]
impl Tool for GetChannelsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "marketo_get_channels".to_string(),
            description: "List Marketo channels".to_string(),
            input_schema: json_schema_object(
                json!({
                    "maxReturn": json_schema_number("Maximum number of channels to return (default: 200)"),
                    "offset": json_schema_number("Integer offset for paging (default: 0)")
                }),
                vec![],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: PageArgs = parse_args("marketo_get_channels", arguments)?;

        let endpoint = with_query(
            "/asset/v1/channels.json",
            &[
                ("maxReturn", Some(args.max_return.unwrap_or(DEFAULT_MAX_RETURN).to_string())),
                ("offset", Some(args.offset.unwrap_or(0).to_string())),
            ],
        );

        Ok(relay(&self.client, ApiRequest::get(endpoint)).await)
    }
}

/// Tool to get one channel
pub struct GetChannelByIdTool {
    client: MarketoClient,
}

impl GetChannelByIdTool {
    pub fn new(client: MarketoClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelIdArgs {
    channel_id: u64,
}

#[async_trait::async_trait]
impl Tool for GetChannelByIdTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "marketo_get_channel_by_id".to_string(),
            description: "Get a Marketo channel by its ID".to_string(),
            input_schema: json_schema_object(
                json!({
                    "channelId": json_schema_number("ID of the channel")
                }),
                vec!["channelId"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: ChannelIdArgs = parse_args("marketo_get_channel_by_id", arguments)?;
        let endpoint = format!("/asset/v1/channel/{}.json", args.channel_id);

        Ok(relay(&self.client, ApiRequest::get(endpoint)).await)
    }
}

/// Channel fields shared by create and update. Absent fields are left out of
/// the body.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChannelFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    channel_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    application_id: Option<u64>,
}

/// Tool to create a channel
pub struct CreateChannelTool {
    client: MarketoClient,
}

impl CreateChannelTool {
    pub fn new(client: MarketoClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Tool for CreateChannelTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "marketo_create_channel".to_string(),
            description: "Create a Marketo channel".to_string(),
            input_schema: json_schema_object(
                json!({
                    "name": json_schema_string("Name of the channel"),
                    "description": json_schema_string("Description of the channel"),
                    "type": json_schema_string("Channel type"),
                    "applicationId": json_schema_number("Application ID")
                }),
                vec!["name", "type"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let fields: ChannelFields = parse_args("marketo_create_channel", arguments)?;
        if fields.name.is_none() || fields.channel_type.is_none() {
            anyhow::bail!("Invalid arguments for marketo_create_channel: name and type are required");
        }

        let request = ApiRequest::post("/asset/v1/channels.json").json(serde_json::to_value(&fields)?);

        Ok(relay(&self.client, request).await)
    }
}

/// Tool to update a channel
pub struct UpdateChannelTool {
    client: MarketoClient,
}

impl UpdateChannelTool {
    pub fn new(client: MarketoClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateChannelArgs {
    channel_id: u64,
    #[serde(flatten)]
    fields: ChannelFields,
}

#[async_trait::async_trait]
impl Tool for UpdateChannelTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "marketo_update_channel".to_string(),
            description: "Update a Marketo channel".to_string(),
            input_schema: json_schema_object(
                json!({
                    "channelId": json_schema_number("ID of the channel"),
                    "name": json_schema_string("New name"),
                    "description": json_schema_string("New description"),
                    "type": json_schema_string("New channel type"),
                    "applicationId": json_schema_number("Application ID")
                }),
                vec!["channelId"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: UpdateChannelArgs = parse_args("marketo_update_channel", arguments)?;

        let request = ApiRequest::post(format!("/asset/v1/channel/{}.json", args.channel_id))
            .json(serde_json::to_value(&args.fields)?);

        Ok(relay(&self.client, request).await)
    }
}

/// Tool to delete a channel
pub struct DeleteChannelTool {
    client: MarketoClient,
}

impl DeleteChannelTool {
    pub fn new(client: MarketoClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Tool for DeleteChannelTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "marketo_delete_channel".to_string(),
            description: "Delete a Marketo channel".to_string(),
            input_schema: json_schema_object(
                json!({
                    "channelId": json_schema_number("ID of the channel")
                }),
                vec!["channelId"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: ChannelIdArgs = parse_args("marketo_delete_channel", arguments)?;
        let endpoint = format!("/asset/v1/channel/{}/delete.json", args.channel_id);

        Ok(relay(&self.client, ApiRequest::post(endpoint)).await)
    }
}
