use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::value::RawValue;

use crate::ids::{ItemId, JobId, LocationId, TypeId};

/// Verbatim JSON of one remote element.
///
/// Only the fields the local tables index are modelled; everything else rides
/// along untouched so new upstream fields survive a sync without a schema
/// change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPayload(String);

impl RawPayload {
    pub fn from_raw_value(raw: &RawValue) -> Self {
        Self(raw.get().to_owned())
    }

    pub fn from_json_text(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        serde_json::from_str(&self.0).map_err(PayloadError::from)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("remote payload is missing modelled fields: {0}")]
pub struct PayloadError(#[from] serde_json::Error);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetPayload {
    pub item_id: ItemId,
    pub type_id: TypeId,
    pub location_id: LocationId,
    pub quantity: i64,
    pub raw: RawPayload,
}

#[derive(Deserialize)]
struct AssetFields {
    item_id: ItemId,
    type_id: TypeId,
    location_id: LocationId,
    quantity: i64,
}

impl AssetPayload {
    pub fn from_raw(raw: &RawValue) -> Result<Self, PayloadError> {
        let raw = RawPayload::from_raw_value(raw);
        let fields: AssetFields = raw.parse()?;
        Ok(Self {
            item_id: fields.item_id,
            type_id: fields.type_id,
            location_id: fields.location_id,
            quantity: fields.quantity,
            raw,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndustryJobPayload {
    pub job_id: JobId,
    pub product_type_id: Option<TypeId>,
    pub output_location_id: LocationId,
    pub status: String,
    pub raw: RawPayload,
}

#[derive(Deserialize)]
struct IndustryJobFields {
    job_id: JobId,
    #[serde(default)]
    product_type_id: Option<TypeId>,
    output_location_id: LocationId,
    status: String,
}

impl IndustryJobPayload {
    pub fn from_raw(raw: &RawValue) -> Result<Self, PayloadError> {
        let raw = RawPayload::from_raw_value(raw);
        let fields: IndustryJobFields = raw.parse()?;
        Ok(Self {
            job_id: fields.job_id,
            product_type_id: fields.product_type_id,
            output_location_id: fields.output_location_id,
            status: fields.status,
            raw,
        })
    }
}
