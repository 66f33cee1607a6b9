//! Thin data-fetch layer over the ERP's whitelisted API methods
//!
//! Business rules live server-side. These helpers only build URLs, route the
//! call through [`AuthenticatedClient`] and unwrap Frappe's
//! `{"message": ...}` envelope.

use bytes::Bytes;
use reqwest::Response;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::{ApiRequest, AuthenticatedClient};
use crate::error::{Error, Result};

const API_PREFIX: &str = "tenaciousfreightmaster.tenacious_freightmaster.api";
const GOODS_RECEIPT_DOCTYPE: &str =
    "tenaciousfreightmaster.tenacious_freightmaster.doctype.goods_receipt.goods_receipt";
const SHIPMENT_MANIFEST_DOCTYPE: &str =
    "tenaciousfreightmaster.tenacious_freightmaster.doctype.shipment_manifest.shipment_manifest";
const PRINT_PDF_METHOD: &str = "frappe.utils.print_format.download_pdf";
const VEHICLE_LOG_DOCTYPE: &str = "Vehicle Log";
const VEHICLE_LOG_PRINT_FORMAT: &str = "Vehicle Log Print Format";

/// Paged, searchable document lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListResource {
    GoodsReceipts,
    ShipmentManifests,
    VehicleLogs,
    DeliveryNotes,
    LeftGoodsLogs,
    Customers,
}

impl ListResource {
    pub const ALL: [ListResource; 6] = [
        ListResource::GoodsReceipts,
        ListResource::ShipmentManifests,
        ListResource::VehicleLogs,
        ListResource::DeliveryNotes,
        ListResource::LeftGoodsLogs,
        ListResource::Customers,
    ];

    /// Name accepted on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            ListResource::GoodsReceipts => "goods-receipts",
            ListResource::ShipmentManifests => "shipment-manifests",
            ListResource::VehicleLogs => "vehicle-logs",
            ListResource::DeliveryNotes => "delivery-notes",
            ListResource::LeftGoodsLogs => "left-goods-logs",
            ListResource::Customers => "customers",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.name() == name)
    }

    fn method(&self) -> &'static str {
        match self {
            ListResource::GoodsReceipts => "get_goods_receipts",
            ListResource::ShipmentManifests => "get_shipment_manifests",
            ListResource::VehicleLogs => "get_vehicle_logs",
            ListResource::DeliveryNotes => "get_delivery_notes",
            ListResource::LeftGoodsLogs => "get_left_goods_logs",
            ListResource::Customers => "get_customers",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ListResource::GoodsReceipts => "goods receipts",
            ListResource::ShipmentManifests => "shipment manifests",
            ListResource::VehicleLogs => "vehicle logs",
            ListResource::DeliveryNotes => "delivery notes",
            ListResource::LeftGoodsLogs => "left goods logs",
            ListResource::Customers => "customers",
        }
    }
}

/// Reference data used to fill form pickers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupResource {
    Employees,
    DeliveryPersons,
    Destinations,
    Uoms,
    Items,
    Vehicles,
}

impl LookupResource {
    pub const ALL: [LookupResource; 6] = [
        LookupResource::Employees,
        LookupResource::DeliveryPersons,
        LookupResource::Destinations,
        LookupResource::Uoms,
        LookupResource::Items,
        LookupResource::Vehicles,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LookupResource::Employees => "employees",
            LookupResource::DeliveryPersons => "delivery-persons",
            LookupResource::Destinations => "destinations",
            LookupResource::Uoms => "uoms",
            LookupResource::Items => "items",
            LookupResource::Vehicles => "vehicles",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.name() == name)
    }

    fn method(&self) -> &'static str {
        match self {
            LookupResource::Employees => "get_employees",
            LookupResource::DeliveryPersons => "get_delivery_persons",
            LookupResource::Destinations => "get_destinations",
            LookupResource::Uoms => "get_uoms",
            LookupResource::Items => "get_items",
            LookupResource::Vehicles => "get_vehicles",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            LookupResource::Employees => "employees",
            LookupResource::DeliveryPersons => "delivery persons",
            LookupResource::Destinations => "destinations",
            LookupResource::Uoms => "UOMs",
            LookupResource::Items => "items",
            LookupResource::Vehicles => "vehicles",
        }
    }
}

/// One page of a document list. Absent fields decode as empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListPage {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub total: u64,
    /// Summary counters some lists carry alongside the rows
    #[serde(default)]
    pub metrics: Option<Value>,
}

/// Extra filters the shipment-manifest list understands. Blank values are
/// not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestFilters {
    pub agent: Option<String>,
    pub vehicle: Option<String>,
    pub destination: Option<String>,
}

impl ManifestFilters {
    pub fn is_empty(&self) -> bool {
        self.pairs().next().is_none()
    }

    fn pairs(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("agent", &self.agent),
            ("vehicle", &self.vehicle),
            ("destination", &self.destination),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (key, v))
        })
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    message: Option<T>,
}

#[derive(Deserialize)]
struct DataOnly {
    #[serde(default)]
    data: Vec<Value>,
}

/// ERP API client rooted at the site base URL.
#[derive(Clone)]
pub struct ErpClient {
    client: AuthenticatedClient,
    base_url: String,
}

impl ErpClient {
    pub fn new(client: AuthenticatedClient, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    /// Fetch a document list, optionally filtered by a free-text search.
    pub async fn list(&self, resource: ListResource, search: Option<&str>) -> Result<ListPage> {
        self.fetch_list(resource, search, &ManifestFilters::default())
            .await
    }

    /// Shipment manifests narrowed by agent, vehicle or destination.
    pub async fn shipment_manifests(
        &self,
        search: Option<&str>,
        filters: &ManifestFilters,
    ) -> Result<ListPage> {
        self.fetch_list(ListResource::ShipmentManifests, search, filters)
            .await
    }

    async fn fetch_list(
        &self,
        resource: ListResource,
        search: Option<&str>,
        filters: &ManifestFilters,
    ) -> Result<ListPage> {
        let mut url = self.method_url(&format!("{API_PREFIX}.{}", resource.method()))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(term) = search.map(str::trim).filter(|s| !s.is_empty()) {
                query.append_pair("search", term);
            }
            for (key, value) in filters.pairs() {
                query.append_pair(key, value);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        let page: Option<ListPage> = self.fetch_message(url, resource.label()).await?;
        let page = page.unwrap_or_default();
        debug!(resource = resource.name(), rows = page.data.len(), total = page.total, "fetched list");
        Ok(page)
    }

    /// Fetch a reference list (`message.data`).
    pub async fn lookup(&self, resource: LookupResource) -> Result<Vec<Value>> {
        let url = self.method_url(&format!("{API_PREFIX}.{}", resource.method()))?;
        let data: Option<DataOnly> = self.fetch_message(url, resource.label()).await?;
        Ok(data.map(|d| d.data).unwrap_or_default())
    }

    pub async fn dashboard(&self) -> Result<Value> {
        let url = self.method_url(&format!("{API_PREFIX}.get_dashboard_data"))?;
        let message: Option<Value> = self.fetch_message(url, "dashboard data").await?;
        Ok(message.unwrap_or(Value::Null))
    }

    /// Profile of the signed-in user as the ERP sees it.
    pub async fn current_user(&self) -> Result<Value> {
        let url = self.method_url(&format!("{API_PREFIX}.get_current_user"))?;
        let message: Option<Value> = self.fetch_message(url, "current user").await?;
        Ok(message.unwrap_or(Value::Null))
    }

    /// Download the printable PDF of a vehicle log.
    pub async fn print_vehicle_log(&self, name: &str) -> Result<Bytes> {
        let mut url = self.method_url(PRINT_PDF_METHOD)?;
        url.query_pairs_mut()
            .append_pair("doctype", VEHICLE_LOG_DOCTYPE)
            .append_pair("name", name)
            .append_pair("format", VEHICLE_LOG_PRINT_FORMAT)
            .append_pair("no_letterhead", "1");

        let response = self.client.send(ApiRequest::get(url.as_str())).await?;
        if !response.status().is_success() {
            warn!(status = %response.status(), name, "vehicle log print failed");
            return Err(Error::Api("Failed to fetch Vehicle Log PDF".into()));
        }
        let pdf = response
            .bytes()
            .await
            .map_err(|e| Error::Http(format!("failed to read PDF body: {e}")))?;
        debug!(name, size = pdf.len(), "downloaded vehicle log PDF");
        Ok(pdf)
    }

    /// GET an arbitrary path under the base URL and return the whole JSON body.
    pub async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let response = self.client.send(ApiRequest::get(url)).await?;
        if !response.status().is_success() {
            return Err(Error::Api(format!("Failed to fetch {path}")));
        }
        decode_json(response).await
    }

    /// POST a JSON payload to a whitelisted method and return its `message`.
    pub async fn call_method(&self, method: &str, payload: &Value) -> Result<Value> {
        let url = self.method_url(method)?;
        let response = self
            .client
            .send(ApiRequest::post(url.as_str()).json(payload))
            .await?;

        let status = response.status();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));
        if !is_json {
            warn!(%status, method, "non-JSON response from method call");
            return Err(Error::UnexpectedContent(
                "server returned a non-JSON response; check your authentication".into(),
            ));
        }

        let data = decode_json(response).await?;
        if !status.is_success() {
            let message = text_field(&data, "error")
                .or_else(|| text_field(&data, "message"))
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(Error::Api(message));
        }
        if let Some(error) = text_field(&data, "error") {
            return Err(Error::Api(error));
        }

        match data {
            Value::Object(mut map) if map.contains_key("message") => {
                Ok(map.remove("message").unwrap_or(Value::Null))
            }
            other => Ok(other),
        }
    }

    pub async fn create_goods_receipt(&self, payload: &Value) -> Result<Value> {
        self.call_method(&format!("{API_PREFIX}.create_goods_receipt"), payload)
            .await
    }

    /// Create a shipment manifest from a submitted goods receipt.
    pub async fn create_shipment_manifest(&self, goods_receipt: &str) -> Result<Value> {
        self.call_method(
            &format!("{GOODS_RECEIPT_DOCTYPE}.create_shipment_manifest"),
            &serde_json::json!({ "doc_name": goods_receipt }),
        )
        .await
    }

    /// Create a delivery note from a submitted goods receipt.
    pub async fn create_delivery_note(&self, goods_receipt: &str) -> Result<Value> {
        self.call_method(
            &format!("{GOODS_RECEIPT_DOCTYPE}.create_delivery_note"),
            &serde_json::json!({ "doc_name": goods_receipt }),
        )
        .await
    }

    pub async fn assign_vehicle(&self, manifest: &str, vehicle: &str) -> Result<Value> {
        self.call_method(
            &format!("{SHIPMENT_MANIFEST_DOCTYPE}.assign_vehicle_to_manifest"),
            &serde_json::json!({ "manifest_name": manifest, "vehicle_id": vehicle }),
        )
        .await
    }

    fn method_url(&self, method: &str) -> Result<url::Url> {
        url::Url::parse(&format!("{}/api/method/{method}", self.base_url))
            .map_err(|e| Error::Http(format!("invalid API URL: {e}")))
    }

    async fn fetch_message<T>(&self, url: url::Url, what: &str) -> Result<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self.client.send(ApiRequest::get(url.as_str())).await?;
        if !response.status().is_success() {
            warn!(status = %response.status(), what, "fetch failed");
            return Err(Error::Api(format!("Failed to fetch {what}")));
        }
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| Error::Decode(format!("{what}: {e}")))?;
        Ok(envelope.message)
    }
}

async fn decode_json(response: Response) -> Result<Value> {
    response
        .json()
        .await
        .map_err(|e| Error::Decode(e.to_string()))
}

fn text_field(data: &Value, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Null => None,
        Value::String(_) => None,
        other => Some(other.to_string()),
    }
}
