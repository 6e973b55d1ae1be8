//! `collections`, `attributes`, `attribute_values`, `products`,
//! `product_images`, `product_variants`, and `product_variant_attributes`.

use async_trait::async_trait;
use bazaar_core::catalog::{
    Attribute, AttributeInput, AttributeValue, Collection, CollectionInput, Product,
    ProductFilter, ProductImage, ProductInput, ProductVariant, VariantRecord,
};
use bazaar_core::store::{AttributeRepo, CollectionRepo, ProductRepo, VariantRepo};
use bazaar_core::StoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Postgres, Transaction};

use crate::{delete_err, deleted, store_err, PgStore};

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CollectionRow {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub parent_id: Option<i64>,
}

impl From<CollectionRow> for Collection {
    fn from(row: CollectionRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            image: row.image,
            parent_id: row.parent_id,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttributeRow {
    pub id: i64,
    pub title: String,
    pub collection_id: Option<i64>,
}

impl From<AttributeRow> for Attribute {
    fn from(row: AttributeRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            collection_id: row.collection_id,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttributeValueRow {
    pub id: i64,
    pub attribute_id: i64,
    pub value: String,
}

impl From<AttributeValueRow> for AttributeValue {
    fn from(row: AttributeValueRow) -> Self {
        Self {
            id: row.id,
            attribute_id: row.attribute_id,
            value: row.value,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub collection_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            collection_id: row.collection_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductImageRow {
    pub id: i64,
    pub product_id: i64,
    pub image: String,
}

impl From<ProductImageRow> for ProductImage {
    fn from(row: ProductImageRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            image: row.image,
        }
    }
}

/// A `product_variants` row with its attribute-value ids aggregated in
/// submission order.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VariantRow {
    pub id: i64,
    pub product_id: i64,
    pub price: Option<Decimal>,
    pub stock: i32,
    pub attribute_value_ids: Vec<i64>,
}

impl From<VariantRow> for ProductVariant {
    fn from(row: VariantRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            price: row.price,
            stock: row.stock,
            attribute_value_ids: row.attribute_value_ids,
        }
    }
}

const COLLECTION_COLUMNS: &str = "id, title, description, image, parent_id";
const PRODUCT_COLUMNS: &str = "id, title, description, collection_id, created_at, updated_at";

const VARIANT_SELECT: &str = "SELECT v.id, v.product_id, v.price, v.stock, \
         COALESCE(ARRAY_AGG(pva.attribute_value_id ORDER BY pva.position) \
                  FILTER (WHERE pva.attribute_value_id IS NOT NULL), '{}') AS attribute_value_ids \
     FROM product_variants v \
     LEFT JOIN product_variant_attributes pva ON pva.variant_id = v.id";

// ---------------------------------------------------------------------------
// collections
// ---------------------------------------------------------------------------

#[async_trait]
impl CollectionRepo for PgStore {
    async fn list_collections(&self) -> Result<Vec<Collection>, StoreError> {
        let rows = sqlx::query_as::<_, CollectionRow>(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(Collection::from).collect())
    }

    async fn get_collection(&self, id: i64) -> Result<Option<Collection>, StoreError> {
        let row = sqlx::query_as::<_, CollectionRow>(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.map(Collection::from))
    }

    async fn list_subcollections(&self, parent_id: i64) -> Result<Vec<Collection>, StoreError> {
        let rows = sqlx::query_as::<_, CollectionRow>(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections WHERE parent_id = $1 ORDER BY id"
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(Collection::from).collect())
    }

    async fn create_collection(&self, input: &CollectionInput) -> Result<Collection, StoreError> {
        let row = sqlx::query_as::<_, CollectionRow>(&format!(
            "INSERT INTO collections (title, description, image, parent_id) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLLECTION_COLUMNS}"
        ))
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.image)
        .bind(input.parent_id)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.into())
    }

    async fn update_collection(
        &self,
        id: i64,
        input: &CollectionInput,
    ) -> Result<Collection, StoreError> {
        let row = sqlx::query_as::<_, CollectionRow>(&format!(
            "UPDATE collections \
             SET title = $2, description = $3, image = $4, parent_id = $5 \
             WHERE id = $1 \
             RETURNING {COLLECTION_COLUMNS}"
        ))
        .bind(id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.image)
        .bind(input.parent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.map(Collection::from)
            .ok_or_else(|| StoreError::not_found("collection", id))
    }

    async fn delete_collection(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM collections WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(delete_err)?;
        deleted(result.rows_affected(), "collection", id)
    }
}

// ---------------------------------------------------------------------------
// attributes / attribute_values
// ---------------------------------------------------------------------------

#[async_trait]
impl AttributeRepo for PgStore {
    async fn list_attributes(
        &self,
        collection_id: Option<i64>,
    ) -> Result<Vec<Attribute>, StoreError> {
        let rows = sqlx::query_as::<_, AttributeRow>(
            "SELECT id, title, collection_id FROM attributes \
             WHERE ($1::BIGINT IS NULL OR collection_id = $1) \
             ORDER BY id",
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(Attribute::from).collect())
    }

    async fn get_attribute(&self, id: i64) -> Result<Option<Attribute>, StoreError> {
        let row = sqlx::query_as::<_, AttributeRow>(
            "SELECT id, title, collection_id FROM attributes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.map(Attribute::from))
    }

    async fn create_attribute(&self, input: &AttributeInput) -> Result<Attribute, StoreError> {
        let row = sqlx::query_as::<_, AttributeRow>(
            "INSERT INTO attributes (title, collection_id) VALUES ($1, $2) \
             RETURNING id, title, collection_id",
        )
        .bind(&input.title)
        .bind(input.collection_id)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.into())
    }

    async fn update_attribute(
        &self,
        id: i64,
        input: &AttributeInput,
    ) -> Result<Attribute, StoreError> {
        let row = sqlx::query_as::<_, AttributeRow>(
            "UPDATE attributes SET title = $2, collection_id = $3 WHERE id = $1 \
             RETURNING id, title, collection_id",
        )
        .bind(id)
        .bind(&input.title)
        .bind(input.collection_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.map(Attribute::from)
            .ok_or_else(|| StoreError::not_found("attribute", id))
    }

    async fn delete_attribute(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM attributes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(delete_err)?;
        deleted(result.rows_affected(), "attribute", id)
    }

    async fn required_attribute_ids(&self, collection_id: i64) -> Result<Vec<i64>, StoreError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT id FROM attributes WHERE collection_id = $1 ORDER BY id",
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)
    }

    async fn create_attribute_value(
        &self,
        attribute_id: i64,
        value: &str,
    ) -> Result<AttributeValue, StoreError> {
        let row = sqlx::query_as::<_, AttributeValueRow>(
            "INSERT INTO attribute_values (attribute_id, value) VALUES ($1, $2) \
             RETURNING id, attribute_id, value",
        )
        .bind(attribute_id)
        .bind(value)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.into())
    }

    async fn delete_attribute_value(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM attribute_values WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(delete_err)?;
        deleted(result.rows_affected(), "attribute value", id)
    }

    async fn get_attribute_values(&self, ids: &[i64]) -> Result<Vec<AttributeValue>, StoreError> {
        let rows = sqlx::query_as::<_, AttributeValueRow>(
            "SELECT id, attribute_id, value FROM attribute_values \
             WHERE id = ANY($1) ORDER BY id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(AttributeValue::from).collect())
    }

    async fn list_values_for_attributes(
        &self,
        attribute_ids: &[i64],
    ) -> Result<Vec<AttributeValue>, StoreError> {
        let rows = sqlx::query_as::<_, AttributeValueRow>(
            "SELECT id, attribute_id, value FROM attribute_values \
             WHERE attribute_id = ANY($1) ORDER BY id",
        )
        .bind(attribute_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(AttributeValue::from).collect())
    }
}

// ---------------------------------------------------------------------------
// products / product_images
// ---------------------------------------------------------------------------

async fn insert_product_images<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    product_id: i64,
    images: &[String],
) -> Result<Vec<ProductImage>, StoreError> {
    let rows = sqlx::query_as::<_, ProductImageRow>(
        "INSERT INTO product_images (product_id, image) \
         SELECT $1, image FROM UNNEST($2::VARCHAR[]) AS t(image) \
         RETURNING id, product_id, image",
    )
    .bind(product_id)
    .bind(images)
    .fetch_all(executor)
    .await
    .map_err(store_err)?;
    Ok(rows.into_iter().map(ProductImage::from).collect())
}

#[async_trait]
impl ProductRepo for PgStore {
    /// Every `(title, value)` pair must be carried by some variant; the price
    /// bounds must hold for some priced variant.
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let (titles, values): (Vec<String>, Vec<String>) =
            filter.attributes.iter().cloned().unzip();

        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT p.id, p.title, p.description, p.collection_id, p.created_at, p.updated_at \
             FROM products p \
             WHERE ($1::BIGINT IS NULL OR p.collection_id = $1) \
               AND NOT EXISTS ( \
                   SELECT 1 FROM UNNEST($2::TEXT[], $3::TEXT[]) AS f(title, value) \
                   WHERE NOT EXISTS ( \
                       SELECT 1 FROM product_variants v \
                       JOIN product_variant_attributes pva ON pva.variant_id = v.id \
                       JOIN attribute_values av ON av.id = pva.attribute_value_id \
                       JOIN attributes a ON a.id = av.attribute_id \
                       WHERE v.product_id = p.id AND a.title = f.title AND av.value = f.value)) \
               AND (($4::NUMERIC IS NULL AND $5::NUMERIC IS NULL) OR EXISTS ( \
                   SELECT 1 FROM product_variants v \
                   WHERE v.product_id = p.id AND v.price IS NOT NULL \
                     AND ($4::NUMERIC IS NULL OR v.price >= $4) \
                     AND ($5::NUMERIC IS NULL OR v.price <= $5))) \
             ORDER BY p.id",
        )
        .bind(filter.collection_id)
        .bind(&titles)
        .bind(&values)
        .bind(filter.min_price)
        .bind(filter.max_price)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.map(Product::from))
    }

    async fn create_product(
        &self,
        input: &ProductInput,
        images: &[String],
    ) -> Result<Product, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO products (title, description, collection_id) VALUES ($1, $2, $3) \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.collection_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err)?;
        if !images.is_empty() {
            insert_product_images(&mut *tx, row.id, images).await?;
        }
        tx.commit().await.map_err(store_err)?;
        Ok(row.into())
    }

    async fn update_product(&self, id: i64, input: &ProductInput) -> Result<Product, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE products \
             SET title = $2, description = $3, collection_id = $4, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.collection_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.map(Product::from)
            .ok_or_else(|| StoreError::not_found("product", id))
    }

    async fn delete_product(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(delete_err)?;
        deleted(result.rows_affected(), "product", id)
    }

    async fn add_product_images(
        &self,
        product_id: i64,
        images: &[String],
    ) -> Result<Vec<ProductImage>, StoreError> {
        insert_product_images(&self.pool, product_id, images).await
    }

    async fn list_product_images(
        &self,
        product_ids: &[i64],
    ) -> Result<Vec<ProductImage>, StoreError> {
        let rows = sqlx::query_as::<_, ProductImageRow>(
            "SELECT id, product_id, image FROM product_images \
             WHERE product_id = ANY($1) ORDER BY id",
        )
        .bind(product_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(ProductImage::from).collect())
    }
}

// ---------------------------------------------------------------------------
// product_variants / product_variant_attributes
// ---------------------------------------------------------------------------

/// Distinct ids in first-seen order, with their positions.
fn positioned(ids: &[i64]) -> (Vec<i64>, Vec<i32>) {
    let mut distinct: Vec<i64> = Vec::with_capacity(ids.len());
    for id in ids {
        if !distinct.contains(id) {
            distinct.push(*id);
        }
    }
    let positions = (0..distinct.len())
        .map(|i| i32::try_from(i).unwrap_or(i32::MAX))
        .collect();
    (distinct, positions)
}

async fn insert_variant_attributes(
    tx: &mut Transaction<'_, Postgres>,
    variant_id: i64,
    ids: &[i64],
    positions: &[i32],
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO product_variant_attributes (variant_id, attribute_value_id, position) \
         SELECT $1, value_id, pos FROM UNNEST($2::BIGINT[], $3::INT[]) AS t(value_id, pos)",
    )
    .bind(variant_id)
    .bind(ids)
    .bind(positions)
    .execute(&mut **tx)
    .await
    .map_err(store_err)?;
    Ok(())
}

#[async_trait]
impl VariantRepo for PgStore {
    async fn list_variants(
        &self,
        product_ids: Option<&[i64]>,
    ) -> Result<Vec<ProductVariant>, StoreError> {
        let rows = sqlx::query_as::<_, VariantRow>(&format!(
            "{VARIANT_SELECT} \
             WHERE ($1::BIGINT[] IS NULL OR v.product_id = ANY($1)) \
             GROUP BY v.id ORDER BY v.id"
        ))
        .bind(product_ids.map(<[i64]>::to_vec))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(ProductVariant::from).collect())
    }

    async fn get_variant(&self, id: i64) -> Result<Option<ProductVariant>, StoreError> {
        let row = sqlx::query_as::<_, VariantRow>(&format!(
            "{VARIANT_SELECT} WHERE v.id = $1 GROUP BY v.id"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.map(ProductVariant::from))
    }

    async fn create_variant(&self, record: &VariantRecord) -> Result<ProductVariant, StoreError> {
        let (ids, positions) = positioned(&record.attribute_value_ids);
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let id: i64 = sqlx::query_scalar::<_, i64>(
            "INSERT INTO product_variants (product_id, price, stock) VALUES ($1, $2, $3) \
             RETURNING id",
        )
        .bind(record.product_id)
        .bind(record.price)
        .bind(record.stock)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err)?;

        insert_variant_attributes(&mut tx, id, &ids, &positions).await?;
        tx.commit().await.map_err(store_err)?;

        Ok(ProductVariant {
            id,
            product_id: record.product_id,
            price: record.price,
            stock: record.stock,
            attribute_value_ids: ids,
        })
    }

    async fn replace_variant(
        &self,
        id: i64,
        record: &VariantRecord,
    ) -> Result<ProductVariant, StoreError> {
        let (ids, positions) = positioned(&record.attribute_value_ids);
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let updated = sqlx::query(
            "UPDATE product_variants SET product_id = $2, price = $3, stock = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(record.product_id)
        .bind(record.price)
        .bind(record.stock)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::not_found("variant", id));
        }

        sqlx::query("DELETE FROM product_variant_attributes WHERE variant_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        insert_variant_attributes(&mut tx, id, &ids, &positions).await?;
        tx.commit().await.map_err(store_err)?;

        Ok(ProductVariant {
            id,
            product_id: record.product_id,
            price: record.price,
            stock: record.stock,
            attribute_value_ids: ids,
        })
    }

    async fn delete_variant(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM product_variants WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(delete_err)?;
        deleted(result.rows_affected(), "variant", id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positioned_dedups_in_first_seen_order() {
        let (ids, positions) = positioned(&[7, 3, 7, 9]);
        assert_eq!(ids, vec![7, 3, 9]);
        assert_eq!(positions, vec![0, 1, 2]);
    }
}
