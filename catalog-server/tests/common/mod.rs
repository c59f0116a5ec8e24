//! Shared helpers for API tests
//!
//! The router runs against an in-memory repository and real local storage in
//! a temp dir, so tests can inspect both rows and files.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use catalog_server::db::{CatalogRepository, RepoError, RepoResult, UpdatedProduct};
use catalog_server::storage::{
    DeleteOutcome, ImageStore, LocalImageStore, StorageError, StorageResult, UploadLimits,
    UploadedImage,
};
use catalog_server::{AppState, create_router};
use shared::models::{Product, ProductCreate, ProductFull, ProductImage, ProductUpdate};

/// Smallest byte strings that sniff as PNG / JPEG
pub const PNG: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R',
];
pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0];

// =============================================================================
// In-memory repository
// =============================================================================

#[derive(Default)]
struct Tables {
    next_product_id: i64,
    next_image_id: i64,
    products: BTreeMap<i64, Product>,
    images: BTreeMap<i64, ProductImage>,
}

impl Tables {
    fn full(&self, product: &Product) -> ProductFull {
        let images = self
            .images
            .values()
            .filter(|img| img.product_id == product.id)
            .cloned()
            .collect();
        ProductFull::new(product.clone(), images)
    }

    fn sku_taken(&self, sku: &str, except: Option<i64>) -> bool {
        self.products
            .values()
            .any(|p| p.sku == sku && Some(p.id) != except)
    }

    fn insert_images(&mut self, product_id: i64, urls: &[String]) {
        for url in urls {
            self.next_image_id += 1;
            let id = self.next_image_id;
            self.images.insert(
                id,
                ProductImage {
                    id,
                    url: url.clone(),
                    product_id,
                },
            );
        }
    }
}

/// `CatalogRepository` over a mutex-guarded map
///
/// Each method applies all of its changes or none, like a transaction.
#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
    fail_ping: AtomicBool,
    vanish_on_update: AtomicBool,
    closed: AtomicBool,
}

impl MemoryRepository {
    /// Make every following write fail with a database error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_ping(&self, fail: bool) {
        self.fail_ping.store(fail, Ordering::SeqCst);
    }

    /// Delete the product right before the next update applies, as a
    /// concurrent request would
    pub fn vanish_on_update(&self, vanish: bool) {
        self.vanish_on_update.store(vanish, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn product_count(&self) -> usize {
        self.tables.lock().unwrap().products.len()
    }

    pub fn image_rows(&self) -> Vec<ProductImage> {
        self.tables.lock().unwrap().images.values().cloned().collect()
    }

    fn check_write(&self) -> RepoResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(RepoError::Database("injected write failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CatalogRepository for MemoryRepository {
    async fn list_products(&self) -> RepoResult<Vec<ProductFull>> {
        let t = self.tables.lock().unwrap();
        Ok(t.products.values().map(|p| t.full(p)).collect())
    }

    async fn find_product(&self, id: i64) -> RepoResult<Option<ProductFull>> {
        let t = self.tables.lock().unwrap();
        Ok(t.products.get(&id).map(|p| t.full(p)))
    }

    async fn find_images(
        &self,
        product_id: i64,
        image_ids: &[i64],
    ) -> RepoResult<Vec<ProductImage>> {
        let t = self.tables.lock().unwrap();
        Ok(t.images
            .values()
            .filter(|img| img.product_id == product_id && image_ids.contains(&img.id))
            .cloned()
            .collect())
    }

    async fn create_product(
        &self,
        data: &ProductCreate,
        image_urls: &[String],
    ) -> RepoResult<ProductFull> {
        self.check_write()?;
        let mut t = self.tables.lock().unwrap();
        if t.sku_taken(&data.sku, None) {
            return Err(RepoError::Duplicate("products_sku_key".into()));
        }

        t.next_product_id += 1;
        let product = Product {
            id: t.next_product_id,
            sku: data.sku.clone(),
            name: data.name.clone(),
            price: data.price,
        };
        t.products.insert(product.id, product.clone());
        t.insert_images(product.id, image_urls);
        Ok(t.full(&product))
    }

    async fn update_product(
        &self,
        id: i64,
        data: &ProductUpdate,
        new_image_urls: &[String],
    ) -> RepoResult<UpdatedProduct> {
        self.check_write()?;
        let mut t = self.tables.lock().unwrap();
        if self.vanish_on_update.swap(false, Ordering::SeqCst) {
            t.products.remove(&id);
            t.images.retain(|_, img| img.product_id != id);
        }
        if !t.products.contains_key(&id) {
            return Err(RepoError::NotFound(format!("product {id}")));
        }
        if let Some(sku) = &data.sku
            && t.sku_taken(sku, Some(id))
        {
            return Err(RepoError::Duplicate("products_sku_key".into()));
        }
        let owned = data.image_ids_to_delete.iter().all(|rid| {
            t.images
                .get(rid)
                .is_some_and(|img| img.product_id == id)
        });
        if !owned {
            return Err(RepoError::NotFound(format!("images of product {id}")));
        }

        let removed_images = data
            .image_ids_to_delete
            .iter()
            .filter_map(|rid| t.images.remove(rid))
            .collect();

        let product = t.products.get_mut(&id).expect("checked above");
        if let Some(sku) = &data.sku {
            product.sku = sku.clone();
        }
        if let Some(name) = &data.name {
            product.name = name.clone();
        }
        if let Some(price) = data.price {
            product.price = price;
        }
        let product = product.clone();

        t.insert_images(id, new_image_urls);
        Ok(UpdatedProduct {
            product: t.full(&product),
            removed_images,
        })
    }

    async fn delete_product(&self, id: i64) -> RepoResult<Vec<ProductImage>> {
        self.check_write()?;
        let mut t = self.tables.lock().unwrap();
        if t.products.remove(&id).is_none() {
            return Err(RepoError::NotFound(format!("product {id}")));
        }
        let ids: Vec<i64> = t
            .images
            .values()
            .filter(|img| img.product_id == id)
            .map(|img| img.id)
            .collect();
        Ok(ids.iter().filter_map(|iid| t.images.remove(iid)).collect())
    }

    async fn delete_image(&self, product_id: i64, image_id: i64) -> RepoResult<ProductImage> {
        self.check_write()?;
        let mut t = self.tables.lock().unwrap();
        match t.images.get(&image_id) {
            Some(img) if img.product_id == product_id => {
                Ok(t.images.remove(&image_id).expect("present"))
            }
            _ => Err(RepoError::NotFound(format!(
                "image {image_id} of product {product_id}"
            ))),
        }
    }

    async fn ping(&self) -> RepoResult<()> {
        if self.fail_ping.load(Ordering::SeqCst) {
            Err(RepoError::Unavailable("injected ping failure".into()))
        } else {
            Ok(())
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// =============================================================================
// Storage with failure injection
// =============================================================================

/// Local store that can be told to fail writes or deletes
pub struct FlakyStore {
    inner: LocalImageStore,
    /// Writes allowed before every further write fails
    writes_before_failure: AtomicUsize,
    fail_deletes: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: LocalImageStore) -> Self {
        Self {
            inner,
            writes_before_failure: AtomicUsize::new(usize::MAX),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn fail_writes_after(&self, successful: usize) {
        self.writes_before_failure.store(successful, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ImageStore for FlakyStore {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn store(&self, image: &UploadedImage) -> StorageResult<String> {
        let allowed = self
            .writes_before_failure
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if allowed.is_err() {
            return Err(StorageError::Backend("injected write failure".into()));
        }
        self.inner.store(image).await
    }

    async fn delete(&self, reference: &str) -> StorageResult<DeleteOutcome> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("injected delete failure".into()));
        }
        self.inner.delete(reference).await
    }

    async fn exists(&self, reference: &str) -> StorageResult<bool> {
        self.inner.exists(reference).await
    }
}

// =============================================================================
// Test application
// =============================================================================

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<MemoryRepository>,
    pub store: Arc<FlakyStore>,
    pub state: AppState,
    pub upload_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_limits(UploadLimits::default()).await
    }

    pub async fn with_limits(limits: UploadLimits) -> Self {
        let upload_dir = tempfile::tempdir().unwrap();
        let local = LocalImageStore::new(upload_dir.path().to_path_buf(), "/uploads".into())
            .await
            .unwrap();
        let store = Arc::new(FlakyStore::new(local));
        let repo = Arc::new(MemoryRepository::default());

        let state = AppState::new(repo.clone(), store.clone(), limits)
            .with_static_files("/uploads", upload_dir.path().to_path_buf());
        let router = create_router(state.clone());

        Self {
            router,
            repo,
            store,
            state,
            upload_dir,
        }
    }

    /// Number of files currently in the upload directory
    pub fn stored_file_count(&self) -> usize {
        std::fs::read_dir(self.upload_dir.path()).unwrap().count()
    }

    /// Whether the file behind a `/uploads/...` reference exists
    pub fn file_exists(&self, reference: &str) -> bool {
        let name = reference.strip_prefix("/uploads/").expect("local reference");
        self.upload_dir.path().join(name).is_file()
    }

    pub fn upload_path(&self) -> &Path {
        self.upload_dir.path()
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(req).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(req).await
    }

    pub async fn post_form(&self, uri: &str, form: MultipartForm) -> (StatusCode, Value) {
        self.send(form.into_request("POST", uri)).await
    }

    pub async fn put_form(&self, uri: &str, form: MultipartForm) -> (StatusCode, Value) {
        self.send(form.into_request("PUT", uri)).await
    }

    pub async fn send_json(&self, method: &str, uri: &str, body: &Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(req).await
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }

    /// Create a product through the API, returning its JSON
    pub async fn create_product(&self, sku: &str, files: usize) -> Value {
        let mut form = MultipartForm::new()
            .text("sku", sku)
            .text("name", "Widget")
            .text("price", "19.99");
        for i in 0..files {
            form = form.file("images", &format!("photo-{i}.png"), "image/png", PNG);
        }
        let (status, body) = self.post_form("/products/create", form).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }
}

/// Image urls of a product JSON, in order
pub fn image_urls(product: &Value) -> Vec<String> {
    product["images"]
        .as_array()
        .unwrap()
        .iter()
        .map(|img| img["url"].as_str().unwrap().to_string())
        .collect()
}

pub fn image_ids(product: &Value) -> Vec<i64> {
    product["images"]
        .as_array()
        .unwrap()
        .iter()
        .map(|img| img["id"].as_i64().unwrap())
        .collect()
}

// =============================================================================
// Multipart body builder
// =============================================================================

pub fn generate_boundary() -> String {
    format!("----WebKitFormBoundary{}", Uuid::new_v4().simple())
}

pub struct MultipartForm {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self {
            boundary: generate_boundary(),
            body: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                self.boundary, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                self.boundary, name, file_name, content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn into_request(mut self, method: &str, uri: &str) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", self.boundary),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}
