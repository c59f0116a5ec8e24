//! Product request bodies
//!
//! Create and update requests arrive either as `multipart/form-data` (text
//! fields `sku`, `name`, `price`, `imageIdsToDelete`, and up to N files under
//! `images` or `images[]`) or as an `application/json` object with the same
//! keys and no files. The body is read once into a [`ProductForm`], then
//! validated into a create or update payload.

use std::str::FromStr;

use axum::Json;
use axum::body::Bytes;
use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Multipart, Request};
use http::{HeaderMap, StatusCode, header};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{ProductCreate, ProductUpdate};

use crate::storage::{UploadLimits, UploadedImage};

const IMAGE_FIELDS: &[&str] = &["images", "images[]"];
const DELETE_IDS_FIELDS: &[&str] = &["imageIdsToDelete", "imageIdsToDelete[]"];

/// Largest price that fits NUMERIC(10,2)
const MAX_PRICE_EXCLUSIVE: i64 = 100_000_000;

/// Raw product form as read from the request
#[derive(Debug, Default)]
pub struct ProductForm {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub price: Option<String>,
    pub image_ids_to_delete: Vec<i64>,
    pub images: Vec<UploadedImage>,
}

/// JSON body of a create or update request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductJson {
    sku: Option<String>,
    name: Option<String>,
    price: Option<PriceValue>,
    image_ids_to_delete: Option<Value>,
}

/// `price` as sent by JSON clients
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PriceValue {
    Number(serde_json::Number),
    Text(String),
}

impl PriceValue {
    fn into_text(self) -> String {
        match self {
            PriceValue::Number(n) => n.to_string(),
            PriceValue::Text(s) => s,
        }
    }
}

impl ProductJson {
    fn into_form(self) -> AppResult<ProductForm> {
        let image_ids_to_delete = match self.image_ids_to_delete {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(raw)) => parse_image_ids(&raw)?,
            Some(given @ (Value::Array(_) | Value::Number(_))) => {
                let values = match &given {
                    Value::Array(values) => values.as_slice(),
                    single => std::slice::from_ref(single),
                };
                ids_from_values(values).ok_or_else(|| invalid_image_ids(&given.to_string()))?
            }
            Some(other) => return Err(invalid_image_ids(&other.to_string())),
        };

        Ok(ProductForm {
            sku: self.sku.and_then(non_blank),
            name: self.name.and_then(non_blank),
            price: self.price.map(PriceValue::into_text).and_then(non_blank),
            image_ids_to_delete,
            images: Vec::new(),
        })
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::trim)
        .is_some_and(|mime| {
            mime.eq_ignore_ascii_case("application/json")
                || (mime.starts_with("application/") && mime.ends_with("+json"))
        })
}

fn json_error(err: JsonRejection) -> AppError {
    AppError::with_message(
        ErrorCode::InvalidRequest,
        format!("Invalid JSON body: {}", err.body_text()),
    )
}

impl ProductForm {
    /// Read a create or update body, JSON or multipart by `Content-Type`
    ///
    /// Anything that is not JSON goes down the multipart path, whose
    /// rejection explains what was expected.
    pub async fn from_request(req: Request, limits: &UploadLimits) -> AppResult<Self> {
        if is_json(req.headers()) {
            let Json(body) = Json::<ProductJson>::from_request(req, &())
                .await
                .map_err(json_error)?;
            body.into_form()
        } else {
            let multipart = Multipart::from_request(req, &()).await;
            Self::from_multipart(multipart, limits).await
        }
    }

    /// Read the whole multipart body
    ///
    /// File count and per-file size are enforced while streaming, so an
    /// oversized upload is rejected before it is buffered in full.
    async fn from_multipart(
        multipart: Result<Multipart, MultipartRejection>,
        limits: &UploadLimits,
    ) -> AppResult<Self> {
        let mut multipart = multipart.map_err(|e| {
            AppError::with_message(
                ErrorCode::InvalidRequest,
                format!("Expected a multipart/form-data body: {e}"),
            )
        })?;

        let mut form = ProductForm::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();

            if IMAGE_FIELDS.contains(&name.as_str()) {
                if let Some(image) = read_image(field, limits, form.images.len()).await? {
                    form.images.push(image);
                }
            } else if DELETE_IDS_FIELDS.contains(&name.as_str()) {
                let raw = field.text().await.map_err(multipart_error)?;
                form.image_ids_to_delete.extend(parse_image_ids(&raw)?);
            } else if field.file_name().is_some() {
                return Err(AppError::with_message(
                    ErrorCode::UnexpectedFileField,
                    format!("Unexpected file field {name:?}, send images as \"images\""),
                )
                .with_detail("field", name));
            } else {
                let slot = match name.as_str() {
                    "sku" => &mut form.sku,
                    "name" => &mut form.name,
                    "price" => &mut form.price,
                    // Unknown text fields are ignored
                    _ => continue,
                };
                let value = field.text().await.map_err(multipart_error)?;
                *slot = non_blank(value);
            }
        }

        Ok(form)
    }

    /// Validate into a create payload; `sku`, `name` and `price` are required
    pub fn into_create(self) -> AppResult<(ProductCreate, Vec<UploadedImage>)> {
        if !self.image_ids_to_delete.is_empty() {
            return Err(AppError::validation(
                "imageIdsToDelete is not allowed when creating a product",
            ));
        }
        let sku = self.sku.ok_or_else(|| AppError::required_field("sku"))?;
        let name = self.name.ok_or_else(|| AppError::required_field("name"))?;
        let price = self
            .price
            .ok_or_else(|| AppError::required_field("price"))
            .and_then(|p| parse_price(&p))?;

        Ok((ProductCreate { sku, name, price }, self.images))
    }

    /// Validate into a partial update; absent fields stay untouched
    pub fn into_update(self) -> AppResult<(ProductUpdate, Vec<UploadedImage>)> {
        let price = self.price.as_deref().map(parse_price).transpose()?;

        let mut image_ids_to_delete = self.image_ids_to_delete;
        image_ids_to_delete.sort_unstable();
        image_ids_to_delete.dedup();

        Ok((
            ProductUpdate {
                sku: self.sku,
                name: self.name,
                price,
                image_ids_to_delete,
            },
            self.images,
        ))
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::with_message(ErrorCode::FileTooLarge, "Request body is too large")
    } else {
        AppError::with_message(
            ErrorCode::InvalidRequest,
            format!("Malformed multipart body: {}", err.body_text()),
        )
    }
}

/// Stream one file part, enforcing count and size limits
///
/// Returns `None` for the empty part browsers send when no file was chosen.
async fn read_image(
    mut field: Field<'_>,
    limits: &UploadLimits,
    already_read: usize,
) -> AppResult<Option<UploadedImage>> {
    let file_name = field.file_name().map(str::to_string);
    let content_type = field.content_type().map(str::to_string);

    let mut data = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if data.len() + chunk.len() > limits.max_file_size {
            return Err(limits.file_too_large(file_name.as_deref().unwrap_or("image")));
        }
        data.extend_from_slice(&chunk);
    }

    if data.is_empty() && file_name.as_deref().is_some_and(str::is_empty) {
        return Ok(None);
    }

    if already_read >= limits.max_files {
        return Err(limits.too_many_files());
    }

    UploadedImage::validate(
        file_name.as_deref(),
        content_type.as_deref(),
        Bytes::from(data),
        limits,
    )
    .map(Some)
}

/// Parse a price into NUMERIC(10,2)
///
/// Rejects non-numbers, negatives, more than two decimal places and values
/// of 100,000,000 or more.
pub fn parse_price(raw: &str) -> AppResult<Decimal> {
    let trimmed = raw.trim();
    let value = Decimal::from_str(trimmed).map_err(|_| {
        AppError::with_message(
            ErrorCode::InvalidFormat,
            format!("price must be a number, got {trimmed:?}"),
        )
        .with_detail("field", "price")
    })?;

    let invalid = |reason: &str| {
        AppError::with_message(ErrorCode::ProductInvalidPrice, format!("price {reason}"))
            .with_detail("field", "price")
            .with_detail("value", trimmed)
    };

    let mut value = value.normalize();
    if value.is_sign_negative() && !value.is_zero() {
        return Err(invalid("must not be negative"));
    }
    if value.scale() > 2 {
        return Err(invalid("must have at most two decimal places"));
    }
    if value >= Decimal::from(MAX_PRICE_EXCLUSIVE) {
        return Err(invalid("must be less than 100000000"));
    }

    value.set_sign_positive(true);
    value.rescale(2);
    Ok(value)
}

/// Parse `imageIdsToDelete`: `"[1,2]"`, `"1,2"` or a single `"1"`
pub fn parse_image_ids(raw: &str) -> AppResult<Vec<i64>> {
    let trimmed = raw.trim();
    let invalid = || invalid_image_ids(trimmed);

    if trimmed.starts_with('[') {
        let values: Vec<Value> = serde_json::from_str(trimmed).map_err(|_| invalid())?;
        return ids_from_values(&values).ok_or_else(invalid);
    }

    trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().ok().filter(|id| *id > 0))
        .collect::<Option<Vec<i64>>>()
        .ok_or_else(invalid)
}

/// Positive ids from JSON numbers or numeric strings; `None` if any is not one
fn ids_from_values(values: &[Value]) -> Option<Vec<i64>> {
    values
        .iter()
        .map(|v| match v {
            Value::Number(n) => n.as_i64().filter(|id| *id > 0),
            Value::String(s) => s.trim().parse().ok().filter(|id: &i64| *id > 0),
            _ => None,
        })
        .collect()
}

fn invalid_image_ids(got: &str) -> AppError {
    AppError::with_message(
        ErrorCode::ValidationFailed,
        format!("imageIdsToDelete must be a list of image ids, got {got:?}"),
    )
    .with_detail("field", "imageIdsToDelete")
}

/// Parse a numeric path id
pub fn parse_id(raw: &str, what: &str) -> AppResult<i64> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| {
            AppError::with_message(
                ErrorCode::ValidationFailed,
                format!("{what} must be a positive integer, got {raw:?}"),
            )
            .with_detail("field", what)
        })
}
