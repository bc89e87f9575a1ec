//! Grid item transfer
//!
//! Moves grid items across dashboards as standalone JSON documents: export
//! inlines the stored map-layer blobs so the document is self-contained,
//! import validates the document and re-uploads inlined blobs before the
//! item rejoins a dashboard. Copying duplicates an item in place with a
//! fresh key and a deduplicated variable name.

use crate::api::DashboardApi;
use crate::api::error::ApiError;
use crate::grid_item::{GridItem, MAP_SOURCE, VARIABLE_INPUT_SOURCE, VariableValue};
use serde_json::{Value, json};
use std::collections::HashMap;
use thiserror::Error;

/// Keys an imported grid item document must carry.
pub const REQUIRED_GRID_ITEM_KEYS: [&str; 8] =
    ["i", "x", "y", "w", "h", "source", "args_string", "metadata_string"];

pub const MIN_MAP_LAYER_STRUCTURE: &str = "Map layers must have at minimum, the following structure:
{
    configuration: {
        type: <Some Value>,
        props: {
            source: {
                type: <Some Value>
            }
        }
    }
}";

/// Default filename for exported grid item documents.
pub const EXPORT_FILENAME: &str = "TethysDashGridItem.json";

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Grid Items must include {} keys", REQUIRED_GRID_ITEM_KEYS.join(", "))]
    MissingKeys,

    #[error("{}", MIN_MAP_LAYER_STRUCTURE)]
    MalformedLayer,

    #[error(
        "GeoJSON must include a crs key with the structure {{\"properties\": {{\"name\": \"EPSG:<CODE>\"}}}}"
    )]
    MissingCrs,

    #[error("Grid item payload is not valid JSON: {0}")]
    MalformedPayload(String),

    #[error("No grid item at index {0}")]
    UnknownItem(usize),

    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Exports one grid item as a standalone JSON document. The serialized
/// payload strings are replaced by their parsed values, and for map items
/// every stored layer style/GeoJSON filename is replaced by the blob it
/// names so the document carries everything.
pub async fn export_grid_item(
    api: &dyn DashboardApi,
    item: &GridItem,
) -> Result<Value, TransferError> {
    let metadata: Value = serde_json::from_str(&item.metadata_string)
        .map_err(|e| TransferError::MalformedPayload(e.to_string()))?;
    let mut args: Value = serde_json::from_str(&item.args_string)
        .map_err(|e| TransferError::MalformedPayload(e.to_string()))?;

    if item.source == MAP_SOURCE {
        if let Some(layers) = args.get_mut("layers").and_then(Value::as_array_mut) {
            for layer in layers {
                inline_layer_blobs(api, layer).await?;
            }
        }
    }

    Ok(json!({
        "i": item.i,
        "x": item.x,
        "y": item.y,
        "w": item.w,
        "h": item.h,
        "source": item.source,
        "args_string": args,
        "metadata_string": metadata,
    }))
}

/// Replaces a map layer's stored style/GeoJSON filenames with the blobs
/// they name. A missing style is tolerated and dropped; a missing GeoJSON
/// body makes the layer unusable and aborts the export.
async fn inline_layer_blobs(api: &dyn DashboardApi, layer: &mut Value) -> Result<(), TransferError> {
    let style_filename = layer
        .pointer("/configuration/style")
        .and_then(Value::as_str)
        .map(str::to_string);
    if let Some(filename) = style_filename {
        let response = api.download_json(&filename).await?;
        let configuration = layer
            .get_mut("configuration")
            .and_then(Value::as_object_mut)
            .ok_or(TransferError::MalformedLayer)?;
        match (response.success, response.data) {
            (true, Some(data)) => {
                configuration.insert("style".to_string(), data);
            }
            _ => {
                configuration.remove("style");
                log::error!("Failed to load the style for a map layer");
            }
        }
    }

    let is_stored_geojson = layer
        .pointer("/configuration/props/source/type")
        .and_then(Value::as_str)
        == Some("GeoJSON");
    let geojson_filename = layer
        .pointer("/configuration/props/source/geojson")
        .and_then(Value::as_str)
        .map(str::to_string);
    if is_stored_geojson {
        if let Some(filename) = geojson_filename {
            let response = api.download_json(&filename).await?;
            match (response.success, response.data) {
                (true, Some(data)) => {
                    if let Some(source) = layer
                        .pointer_mut("/configuration/props/source")
                        .and_then(Value::as_object_mut)
                    {
                        source.insert("geojson".to_string(), data);
                    }
                }
                (_, _) => {
                    return Err(TransferError::Rejected(
                        response
                            .message
                            .unwrap_or_else(|| format!("Failed to download {}", filename)),
                    ));
                }
            }
        }
    }

    Ok(())
}

/// Imports a grid item document produced by [`export_grid_item`]. Inlined
/// map layer blobs are uploaded back to the portal and replaced by their
/// new filenames, then the structured payloads are re-serialized into the
/// wire shape.
pub async fn import_grid_item(
    api: &dyn DashboardApi,
    document: &Value,
) -> Result<GridItem, TransferError> {
    let object = document.as_object().ok_or(TransferError::MissingKeys)?;
    if !REQUIRED_GRID_ITEM_KEYS
        .iter()
        .all(|key| object.contains_key(*key))
    {
        return Err(TransferError::MissingKeys);
    }

    let mut args = object["args_string"].clone();
    let metadata = object["metadata_string"].clone();
    let source = object["source"].as_str().unwrap_or_default().to_string();

    if source == MAP_SOURCE {
        if let Some(layers) = args.get_mut("layers").and_then(Value::as_array_mut) {
            for layer in layers {
                upload_layer_blobs(api, layer).await?;
            }
        }
    }

    let coordinate = |key: &str| -> Result<u32, TransferError> {
        object[key]
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or(TransferError::MissingKeys)
    };

    let key = match &object["i"] {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return Err(TransferError::MissingKeys),
    };

    Ok(GridItem {
        i: key,
        x: coordinate("x")?,
        y: coordinate("y")?,
        w: coordinate("w")?,
        h: coordinate("h")?,
        source,
        args_string: args.to_string(),
        metadata_string: metadata.to_string(),
    })
}

/// Validates a layer's minimum structure and moves inlined blobs back into
/// portal storage under fresh filenames.
async fn upload_layer_blobs(api: &dyn DashboardApi, layer: &mut Value) -> Result<(), TransferError> {
    let layer_type = layer.pointer("/configuration/type");
    let source_type = layer.pointer("/configuration/props/source/type");
    if layer_type.is_none_or(Value::is_null) || source_type.is_none_or(Value::is_null) {
        return Err(TransferError::MalformedLayer);
    }

    let is_geojson = source_type.and_then(Value::as_str) == Some("GeoJSON");
    let geojson = layer
        .pointer("/configuration/props/source/geojson")
        .filter(|v| !v.is_null())
        .cloned();
    if is_geojson {
        if let Some(geojson) = geojson {
            // Stored GeoJSON must declare its coordinate reference system.
            if geojson.pointer("/crs/properties/name").is_none() {
                return Err(TransferError::MissingCrs);
            }
            let filename = store_blob(api, &geojson).await?;
            if let Some(source) = layer
                .pointer_mut("/configuration/props/source")
                .and_then(Value::as_object_mut)
            {
                source.insert("geojson".to_string(), Value::String(filename));
            }
        }
    }

    let style = layer
        .pointer("/configuration/style")
        .filter(|v| !v.is_null())
        .cloned();
    if let Some(style) = style {
        let filename = store_blob(api, &style).await?;
        if let Some(configuration) = layer
            .get_mut("configuration")
            .and_then(Value::as_object_mut)
        {
            configuration.insert("style".to_string(), Value::String(filename));
        }
    }

    Ok(())
}

async fn store_blob(api: &dyn DashboardApi, blob: &Value) -> Result<String, TransferError> {
    let filename = format!("{}.json", uuid::Uuid::new_v4());
    let response = api.upload_json(&filename, &blob.to_string()).await?;
    if !response.success {
        return Err(TransferError::Rejected(
            response
                .message
                .unwrap_or_else(|| "Failed to upload JSON".to_string()),
        ));
    }
    Ok(response.filename.unwrap_or(filename))
}

/// Key for a newly created item: one past the largest numeric key in use.
pub fn next_item_key(items: &[GridItem]) -> String {
    let max = items
        .iter()
        .filter_map(|item| item.i.parse::<i64>().ok())
        .fold(0, i64::max);
    (max + 1).to_string()
}

/// Duplicates the item at `index`, returning the extended sequence with the
/// copy appended front-most. A copied variable input gets a fresh variable
/// name (`name_1`, `name_2`, ...) seeded with the original's current value.
pub fn copy_grid_item(
    items: &[GridItem],
    index: usize,
    variable_input_values: &mut HashMap<String, VariableValue>,
) -> Result<Vec<GridItem>, TransferError> {
    let original = items.get(index).ok_or(TransferError::UnknownItem(index))?;
    let mut copy = original.clone();
    copy.i = next_item_key(items);

    if copy.source == VARIABLE_INPUT_SOURCE {
        let mut args: Value = serde_json::from_str(&copy.args_string)
            .map_err(|e| TransferError::MalformedPayload(e.to_string()))?;
        let base = args
            .get("variable_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut suffix = 1;
        let mut candidate = format!("{}_{}", base, suffix);
        while variable_input_values.contains_key(&candidate) {
            suffix += 1;
            candidate = format!("{}_{}", base, suffix);
        }

        if let Some(value) = variable_input_values.get(&base).cloned() {
            variable_input_values.insert(candidate.clone(), value);
        }
        if let Some(object) = args.as_object_mut() {
            object.insert("variable_name".to_string(), Value::String(candidate));
        }
        copy.args_string = args.to_string();
    }

    let mut extended = items.to_vec();
    extended.push(copy);
    Ok(extended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{JsonDownloadResponse, JsonUploadResponse, MockDashboardApi};
    use mockall::predicate::eq;

    fn item(i: &str, source: &str, args: &str) -> GridItem {
        GridItem {
            i: i.to_string(),
            x: 1,
            y: 2,
            w: 10,
            h: 20,
            source: source.to_string(),
            args_string: args.to_string(),
            metadata_string: "{\"refreshRate\": 0}".to_string(),
        }
    }

    fn map_args_with_stored_blobs() -> String {
        json!({
            "layers": [{
                "configuration": {
                    "type": "WebGLTile",
                    "style": "style-abc.json",
                    "props": {
                        "name": "basins",
                        "source": {"type": "GeoJSON", "geojson": "blob-123.json"}
                    }
                }
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_export_inlines_parsed_payloads() {
        let api = MockDashboardApi::new();
        let exported = export_grid_item(&api, &item("3", "Text", "{\"text\": \"hi\"}"))
            .await
            .unwrap();

        assert_eq!(exported["i"], json!("3"));
        assert_eq!(exported["args_string"], json!({"text": "hi"}));
        assert_eq!(exported["metadata_string"], json!({"refreshRate": 0}));
    }

    #[tokio::test]
    async fn test_export_inlines_map_layer_blobs() {
        let mut api = MockDashboardApi::new();
        api.expect_download_json()
            .with(eq("style-abc.json"))
            .returning(|_| {
                Ok(JsonDownloadResponse {
                    success: true,
                    data: Some(json!({"fill": "blue"})),
                    message: None,
                })
            });
        api.expect_download_json()
            .with(eq("blob-123.json"))
            .returning(|_| {
                Ok(JsonDownloadResponse {
                    success: true,
                    data: Some(json!({"type": "FeatureCollection", "features": []})),
                    message: None,
                })
            });

        let map_item = item("1", "Map", &map_args_with_stored_blobs());
        let exported = export_grid_item(&api, &map_item).await.unwrap();

        let layer = &exported["args_string"]["layers"][0]["configuration"];
        assert_eq!(layer["style"], json!({"fill": "blue"}));
        assert_eq!(
            layer["props"]["source"]["geojson"]["type"],
            json!("FeatureCollection")
        );
    }

    #[tokio::test]
    async fn test_export_drops_unloadable_style_but_keeps_going() {
        let mut api = MockDashboardApi::new();
        api.expect_download_json()
            .with(eq("style-abc.json"))
            .returning(|_| {
                Ok(JsonDownloadResponse {
                    success: false,
                    data: None,
                    message: Some("gone".to_string()),
                })
            });
        api.expect_download_json()
            .with(eq("blob-123.json"))
            .returning(|_| {
                Ok(JsonDownloadResponse {
                    success: true,
                    data: Some(json!({})),
                    message: None,
                })
            });

        let map_item = item("1", "Map", &map_args_with_stored_blobs());
        let exported = export_grid_item(&api, &map_item).await.unwrap();
        let layer = &exported["args_string"]["layers"][0]["configuration"];
        assert!(layer.get("style").is_none());
    }

    #[tokio::test]
    async fn test_export_aborts_when_geojson_blob_is_missing() {
        let mut api = MockDashboardApi::new();
        api.expect_download_json()
            .with(eq("style-abc.json"))
            .returning(|_| {
                Ok(JsonDownloadResponse {
                    success: true,
                    data: Some(json!({})),
                    message: None,
                })
            });
        api.expect_download_json()
            .with(eq("blob-123.json"))
            .returning(|_| {
                Ok(JsonDownloadResponse {
                    success: false,
                    data: None,
                    message: Some("blob not found".to_string()),
                })
            });

        let map_item = item("1", "Map", &map_args_with_stored_blobs());
        let error = export_grid_item(&api, &map_item).await.unwrap_err();
        assert!(matches!(error, TransferError::Rejected(message) if message == "blob not found"));
    }

    #[tokio::test]
    async fn test_import_requires_the_full_key_set() {
        let api = MockDashboardApi::new();
        let document = json!({"i": "1", "x": 0, "y": 0});
        let error = import_grid_item(&api, &document).await.unwrap_err();
        assert!(matches!(error, TransferError::MissingKeys));
        assert!(error.to_string().contains("args_string"));
    }

    #[tokio::test]
    async fn test_import_round_trips_a_plain_item() {
        let api = MockDashboardApi::new();
        let exported = export_grid_item(&api, &item("7", "Text", "{\"text\": \"hi\"}"))
            .await
            .unwrap();

        let imported = import_grid_item(&api, &exported).await.unwrap();
        assert_eq!(imported.i, "7");
        assert_eq!((imported.x, imported.y, imported.w, imported.h), (1, 2, 10, 20));
        assert_eq!(
            serde_json::from_str::<Value>(&imported.args_string).unwrap(),
            json!({"text": "hi"})
        );
    }

    #[tokio::test]
    async fn test_import_rejects_underspecified_map_layers() {
        let api = MockDashboardApi::new();
        let document = json!({
            "i": "1", "x": 0, "y": 0, "w": 5, "h": 5,
            "source": "Map",
            "args_string": {"layers": [{"configuration": {"props": {}}}]},
            "metadata_string": {},
        });

        let error = import_grid_item(&api, &document).await.unwrap_err();
        assert!(matches!(error, TransferError::MalformedLayer));
        assert!(error.to_string().contains("minimum"));
    }

    #[tokio::test]
    async fn test_import_requires_crs_on_inlined_geojson() {
        let api = MockDashboardApi::new();
        let document = json!({
            "i": "1", "x": 0, "y": 0, "w": 5, "h": 5,
            "source": "Map",
            "args_string": {"layers": [{
                "configuration": {
                    "type": "VectorLayer",
                    "props": {"source": {
                        "type": "GeoJSON",
                        "geojson": {"type": "FeatureCollection", "features": []}
                    }}
                }
            }]},
            "metadata_string": {},
        });

        let error = import_grid_item(&api, &document).await.unwrap_err();
        assert!(matches!(error, TransferError::MissingCrs));
    }

    #[tokio::test]
    async fn test_import_uploads_inlined_blobs_and_stores_filenames() {
        let mut api = MockDashboardApi::new();
        api.expect_upload_json().times(2).returning(|filename, _| {
            Ok(JsonUploadResponse {
                success: true,
                filename: Some(filename.to_string()),
                message: None,
            })
        });

        let document = json!({
            "i": "1", "x": 0, "y": 0, "w": 5, "h": 5,
            "source": "Map",
            "args_string": {"layers": [{
                "configuration": {
                    "type": "VectorLayer",
                    "style": {"stroke": "red"},
                    "props": {"source": {
                        "type": "GeoJSON",
                        "geojson": {
                            "type": "FeatureCollection",
                            "features": [],
                            "crs": {"properties": {"name": "EPSG:4326"}}
                        }
                    }}
                }
            }]},
            "metadata_string": {},
        });

        let imported = import_grid_item(&api, &document).await.unwrap();
        let args: Value = serde_json::from_str(&imported.args_string).unwrap();
        let configuration = &args["layers"][0]["configuration"];
        assert!(configuration["style"].is_string());
        assert!(configuration["props"]["source"]["geojson"].is_string());
        assert!(
            configuration["props"]["source"]["geojson"]
                .as_str()
                .unwrap()
                .ends_with(".json")
        );
    }

    #[test]
    fn test_next_item_key_skips_non_numeric_keys() {
        let items = vec![
            item("3", "Text", "{}"),
            item("abc", "Text", "{}"),
            item("7", "Text", "{}"),
        ];
        assert_eq!(next_item_key(&items), "8");
        assert_eq!(next_item_key(&[]), "1");
    }

    #[test]
    fn test_copy_plain_item_appends_with_next_key() {
        let items = vec![item("1", "Text", "{\"text\": \"hi\"}")];
        let mut values = HashMap::new();

        let extended = copy_grid_item(&items, 0, &mut values).unwrap();
        assert_eq!(extended.len(), 2);
        assert_eq!(extended[1].i, "2");
        assert_eq!(extended[1].args_string, items[0].args_string);
    }

    #[test]
    fn test_copy_variable_input_dedups_name_and_copies_value() {
        let items = vec![item(
            "1",
            "Variable Input",
            "{\"variable_name\": \"basin\", \"initial_value\": \"yellowstone\"}",
        )];
        let mut values = HashMap::from([
            (
                "basin".to_string(),
                VariableValue::Text("snake".to_string()),
            ),
            (
                "basin_1".to_string(),
                VariableValue::Text("taken".to_string()),
            ),
        ]);

        let extended = copy_grid_item(&items, 0, &mut values).unwrap();
        let args: Value = serde_json::from_str(&extended[1].args_string).unwrap();
        assert_eq!(args["variable_name"], json!("basin_2"));
        assert_eq!(
            values.get("basin_2"),
            Some(&VariableValue::Text("snake".to_string()))
        );
    }

    #[test]
    fn test_copy_out_of_range_is_an_error() {
        let mut values = HashMap::new();
        let error = copy_grid_item(&[], 3, &mut values).unwrap_err();
        assert!(matches!(error, TransferError::UnknownItem(3)));
    }
}
