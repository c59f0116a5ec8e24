//! PostgreSQL catalog repository

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use shared::models::{Product, ProductCreate, ProductFull, ProductImage, ProductUpdate};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use super::{CatalogRepository, RepoError, RepoResult, UpdatedProduct};

#[derive(Debug, Clone)]
pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and bring the schema up to date
    pub async fn connect(database_url: &str, max_connections: u32) -> RepoResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| RepoError::Database(format!("migration failed: {e}")))?;

        tracing::info!("Database connected and migrations applied");
        Ok(Self::new(pool))
    }
}

async fn images_of(
    tx: &mut Transaction<'_, Postgres>,
    product_id: i64,
) -> RepoResult<Vec<ProductImage>> {
    let images = sqlx::query_as::<_, ProductImage>(
        "SELECT id, url, product_id FROM product_images WHERE product_id = $1 ORDER BY id",
    )
    .bind(product_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(images)
}

async fn insert_images(
    tx: &mut Transaction<'_, Postgres>,
    product_id: i64,
    urls: &[String],
) -> RepoResult<()> {
    if urls.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r#"
        INSERT INTO product_images (url, product_id)
        SELECT url, $2 FROM UNNEST($1::text[]) WITH ORDINALITY AS t(url, ord)
        ORDER BY ord
        "#,
    )
    .bind(urls)
    .bind(product_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Lock the product row for the rest of the transaction
async fn lock_product(tx: &mut Transaction<'_, Postgres>, id: i64) -> RepoResult<()> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM products WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
    row.map(|_| ())
        .ok_or_else(|| RepoError::NotFound(format!("product {id}")))
}

fn dedup_ids(ids: &[i64]) -> Vec<i64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn list_products(&self) -> RepoResult<Vec<ProductFull>> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT id, sku, name, price FROM products ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let images = sqlx::query_as::<_, ProductImage>(
            "SELECT id, url, product_id FROM product_images ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_product: HashMap<i64, Vec<ProductImage>> = HashMap::new();
        for image in images {
            by_product.entry(image.product_id).or_default().push(image);
        }

        Ok(products
            .into_iter()
            .map(|p| {
                let images = by_product.remove(&p.id).unwrap_or_default();
                ProductFull::new(p, images)
            })
            .collect())
    }

    async fn find_product(&self, id: i64) -> RepoResult<Option<ProductFull>> {
        let Some(product) = sqlx::query_as::<_, Product>(
            "SELECT id, sku, name, price FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let images = sqlx::query_as::<_, ProductImage>(
            "SELECT id, url, product_id FROM product_images WHERE product_id = $1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(ProductFull::new(product, images)))
    }

    async fn find_images(
        &self,
        product_id: i64,
        image_ids: &[i64],
    ) -> RepoResult<Vec<ProductImage>> {
        if image_ids.is_empty() {
            return Ok(Vec::new());
        }
        let images = sqlx::query_as::<_, ProductImage>(
            r#"
            SELECT id, url, product_id FROM product_images
            WHERE product_id = $1 AND id = ANY($2)
            ORDER BY id
            "#,
        )
        .bind(product_id)
        .bind(image_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(images)
    }

    async fn create_product(
        &self,
        data: &ProductCreate,
        image_urls: &[String],
    ) -> RepoResult<ProductFull> {
        let mut tx = self.pool.begin().await?;

        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (sku, name, price)
            VALUES ($1, $2, $3)
            RETURNING id, sku, name, price
            "#,
        )
        .bind(&data.sku)
        .bind(&data.name)
        .bind(data.price)
        .fetch_one(&mut *tx)
        .await?;

        insert_images(&mut tx, product.id, image_urls).await?;
        let images = images_of(&mut tx, product.id).await?;

        tx.commit().await?;
        Ok(ProductFull::new(product, images))
    }

    async fn update_product(
        &self,
        id: i64,
        data: &ProductUpdate,
        new_image_urls: &[String],
    ) -> RepoResult<UpdatedProduct> {
        let mut tx = self.pool.begin().await?;
        lock_product(&mut tx, id).await?;

        let remove_ids = dedup_ids(&data.image_ids_to_delete);
        let removed_images = if remove_ids.is_empty() {
            Vec::new()
        } else {
            let removed = sqlx::query_as::<_, ProductImage>(
                r#"
                DELETE FROM product_images
                WHERE product_id = $1 AND id = ANY($2)
                RETURNING id, url, product_id
                "#,
            )
            .bind(id)
            .bind(&remove_ids)
            .fetch_all(&mut *tx)
            .await?;

            if removed.len() != remove_ids.len() {
                // Dropping the transaction rolls back the partial delete
                let missing: Vec<i64> = remove_ids
                    .iter()
                    .filter(|rid| !removed.iter().any(|img| img.id == **rid))
                    .copied()
                    .collect();
                return Err(RepoError::NotFound(format!(
                    "images {missing:?} of product {id}"
                )));
            }
            removed
        };

        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET
                sku = COALESCE($2, sku),
                name = COALESCE($3, name),
                price = COALESCE($4, price)
            WHERE id = $1
            RETURNING id, sku, name, price
            "#,
        )
        .bind(id)
        .bind(&data.sku)
        .bind(&data.name)
        .bind(data.price)
        .fetch_one(&mut *tx)
        .await?;

        insert_images(&mut tx, id, new_image_urls).await?;
        let images = images_of(&mut tx, id).await?;

        tx.commit().await?;
        Ok(UpdatedProduct {
            product: ProductFull::new(product, images),
            removed_images,
        })
    }

    async fn delete_product(&self, id: i64) -> RepoResult<Vec<ProductImage>> {
        let mut tx = self.pool.begin().await?;
        lock_product(&mut tx, id).await?;

        // Explicit cascade; the FK's ON DELETE CASCADE would also cover it
        let images = sqlx::query_as::<_, ProductImage>(
            "DELETE FROM product_images WHERE product_id = $1 RETURNING id, url, product_id",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(images)
    }

    async fn delete_image(&self, product_id: i64, image_id: i64) -> RepoResult<ProductImage> {
        sqlx::query_as::<_, ProductImage>(
            r#"
            DELETE FROM product_images
            WHERE product_id = $1 AND id = $2
            RETURNING id, url, product_id
            "#,
        )
        .bind(product_id)
        .bind(image_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("image {image_id} of product {product_id}")))
    }

    async fn ping(&self) -> RepoResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_ids() {
        assert_eq!(dedup_ids(&[3, 1, 3, 2, 1]), vec![1, 2, 3]);
        assert!(dedup_ids(&[]).is_empty());
    }
}
