//! Collections, attributes, products, images, and variants.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use crate::catalog::{
    validate_price, Attribute, AttributeInput, AttributeValue, AttributeWithValues, Collection,
    CollectionDetail, CollectionInput, CollectionRef, Product, ProductDetail, ProductFilter,
    ProductImage, ProductInput, ProductVariant, VariantDetail, VariantInput, VariantRecord,
};
use crate::content::{require_text, MAX_FILE_REF_LEN, MAX_TITLE_LEN};
use crate::services::found;
use crate::store::{AttributeRepo, CollectionRepo, ProductRepo, VariantRepo};
use crate::variants::{resolve_attribute_values, validate_attribute_selection};
use crate::{ServiceError, ValidationError};

#[derive(Clone)]
pub struct CatalogService {
    collections: Arc<dyn CollectionRepo>,
    attributes: Arc<dyn AttributeRepo>,
    products: Arc<dyn ProductRepo>,
    variants: Arc<dyn VariantRepo>,
}

impl CatalogService {
    pub fn new(
        collections: Arc<dyn CollectionRepo>,
        attributes: Arc<dyn AttributeRepo>,
        products: Arc<dyn ProductRepo>,
        variants: Arc<dyn VariantRepo>,
    ) -> Self {
        Self {
            collections,
            attributes,
            products,
            variants,
        }
    }

    // ------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns a store error on backend failure.
    pub async fn list_collections(&self) -> Result<Vec<Collection>, ServiceError> {
        Ok(self.collections.list_collections().await?)
    }

    /// Collection with its direct subcollections and its attributes.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub async fn get_collection(&self, id: i64) -> Result<CollectionDetail, ServiceError> {
        let collection = found(self.collections.get_collection(id).await?, "collection", id)?;
        let subcollections = self
            .collections
            .list_subcollections(id)
            .await?
            .into_iter()
            .map(|c| CollectionRef {
                id: c.id,
                title: c.title,
            })
            .collect();
        let attributes = self.attributes.list_attributes(Some(id)).await?;
        let attributes = self.with_values(attributes).await?;
        Ok(CollectionDetail {
            collection,
            subcollections,
            attributes,
        })
    }

    /// # Errors
    ///
    /// Returns a validation error for a blank title or unknown parent.
    pub async fn create_collection(
        &self,
        input: CollectionInput,
    ) -> Result<Collection, ServiceError> {
        let input = self.clean_collection(None, input).await?;
        let collection = self.collections.create_collection(&input).await?;
        tracing::info!(collection_id = collection.id, "collection created");
        Ok(collection)
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, or a validation error when the
    /// new parent is the collection itself or one of its descendants.
    pub async fn update_collection(
        &self,
        id: i64,
        input: CollectionInput,
    ) -> Result<Collection, ServiceError> {
        found(self.collections.get_collection(id).await?, "collection", id)?;
        let input = self.clean_collection(Some(id), input).await?;
        Ok(self.collections.update_collection(id, &input).await?)
    }

    /// # Errors
    ///
    /// Returns `Protected` while products or subcollections reference it.
    pub async fn delete_collection(&self, id: i64) -> Result<(), ServiceError> {
        self.collections.delete_collection(id).await?;
        tracing::info!(collection_id = id, "collection deleted");
        Ok(())
    }

    /// Products in a collection, narrowed by `filter`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown collection.
    pub async fn collection_products(
        &self,
        id: i64,
        mut filter: ProductFilter,
    ) -> Result<Vec<ProductDetail>, ServiceError> {
        found(self.collections.get_collection(id).await?, "collection", id)?;
        filter.collection_id = Some(id);
        self.list_products(&filter).await
    }

    async fn clean_collection(
        &self,
        id: Option<i64>,
        input: CollectionInput,
    ) -> Result<CollectionInput, ServiceError> {
        let title = require_text("title", &input.title, MAX_TITLE_LEN)?;
        if let Some(parent_id) = input.parent_id {
            // Walk up from the new parent; meeting `id` would close a cycle.
            let mut seen = HashSet::new();
            let mut next = Some(parent_id);
            while let Some(current) = next {
                if Some(current) == id {
                    return Err(ValidationError::field(
                        "parent_id",
                        "a collection cannot be its own ancestor",
                    )
                    .into());
                }
                if !seen.insert(current) {
                    break;
                }
                let Some(ancestor) = self.collections.get_collection(current).await? else {
                    return Err(does_not_exist("parent_id", parent_id).into());
                };
                next = ancestor.parent_id;
            }
        }
        Ok(CollectionInput {
            title,
            description: input.description,
            image: optional_ref("image", input.image)?,
            parent_id: input.parent_id,
        })
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns a store error on backend failure.
    pub async fn list_attributes(
        &self,
        collection_id: Option<i64>,
    ) -> Result<Vec<AttributeWithValues>, ServiceError> {
        let attributes = self.attributes.list_attributes(collection_id).await?;
        self.with_values(attributes).await
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub async fn get_attribute(&self, id: i64) -> Result<AttributeWithValues, ServiceError> {
        let attribute = found(self.attributes.get_attribute(id).await?, "attribute", id)?;
        let mut with_values = self.with_values(vec![attribute]).await?;
        with_values
            .pop()
            .ok_or_else(|| crate::StoreError::not_found("attribute", id).into())
    }

    /// # Errors
    ///
    /// Returns a validation error for a blank title or unknown collection.
    pub async fn create_attribute(&self, input: AttributeInput) -> Result<Attribute, ServiceError> {
        let input = self.clean_attribute(input).await?;
        Ok(self.attributes.create_attribute(&input).await?)
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, or a validation error.
    pub async fn update_attribute(
        &self,
        id: i64,
        input: AttributeInput,
    ) -> Result<Attribute, ServiceError> {
        found(self.attributes.get_attribute(id).await?, "attribute", id)?;
        let input = self.clean_attribute(input).await?;
        Ok(self.attributes.update_attribute(id, &input).await?)
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub async fn delete_attribute(&self, id: i64) -> Result<(), ServiceError> {
        Ok(self.attributes.delete_attribute(id).await?)
    }

    /// Add a selectable value to an attribute.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown attribute and a validation error for
    /// a blank value.
    pub async fn add_attribute_value(
        &self,
        attribute_id: i64,
        value: &str,
    ) -> Result<AttributeValue, ServiceError> {
        found(
            self.attributes.get_attribute(attribute_id).await?,
            "attribute",
            attribute_id,
        )?;
        let value = require_text("value", value, MAX_TITLE_LEN)?;
        Ok(self
            .attributes
            .create_attribute_value(attribute_id, &value)
            .await?)
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub async fn delete_attribute_value(&self, id: i64) -> Result<(), ServiceError> {
        Ok(self.attributes.delete_attribute_value(id).await?)
    }

    async fn clean_attribute(&self, input: AttributeInput) -> Result<AttributeInput, ServiceError> {
        let title = require_text("title", &input.title, MAX_TITLE_LEN)?;
        if let Some(collection_id) = input.collection_id {
            if self.collections.get_collection(collection_id).await?.is_none() {
                return Err(does_not_exist("collection_id", collection_id).into());
            }
        }
        Ok(AttributeInput {
            title,
            collection_id: input.collection_id,
        })
    }

    async fn with_values(
        &self,
        attributes: Vec<Attribute>,
    ) -> Result<Vec<AttributeWithValues>, ServiceError> {
        let ids: Vec<i64> = attributes.iter().map(|a| a.id).collect();
        let mut by_attribute: HashMap<i64, Vec<AttributeValue>> = HashMap::new();
        for value in self.attributes.list_values_for_attributes(&ids).await? {
            by_attribute.entry(value.attribute_id).or_default().push(value);
        }
        Ok(attributes
            .into_iter()
            .map(|attribute| AttributeWithValues {
                values: by_attribute.remove(&attribute.id).unwrap_or_default(),
                attribute,
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Products
    // ------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns a store error on backend failure.
    pub async fn list_products(
        &self,
        filter: &ProductFilter,
    ) -> Result<Vec<ProductDetail>, ServiceError> {
        let products = self.products.list_products(filter).await?;
        self.product_details(products).await
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub async fn get_product(&self, id: i64) -> Result<ProductDetail, ServiceError> {
        let product = found(self.products.get_product(id).await?, "product", id)?;
        self.product_detail(product).await
    }

    /// Create a product, optionally attaching image references.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank title or unknown collection.
    pub async fn create_product(
        &self,
        input: ProductInput,
        images: Vec<String>,
    ) -> Result<ProductDetail, ServiceError> {
        let input = self.clean_product(input).await?;
        let images = clean_refs("images", images)?;
        let product = self.products.create_product(&input, &images).await?;
        tracing::info!(product_id = product.id, "product created");
        self.product_detail(product).await
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, or a validation error.
    pub async fn update_product(
        &self,
        id: i64,
        input: ProductInput,
    ) -> Result<ProductDetail, ServiceError> {
        found(self.products.get_product(id).await?, "product", id)?;
        let input = self.clean_product(input).await?;
        let product = self.products.update_product(id, &input).await?;
        self.product_detail(product).await
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub async fn delete_product(&self, id: i64) -> Result<(), ServiceError> {
        self.products.delete_product(id).await?;
        tracing::info!(product_id = id, "product deleted");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown product and a validation error for
    /// an empty image list.
    pub async fn add_product_images(
        &self,
        product_id: i64,
        images: Vec<String>,
    ) -> Result<Vec<ProductImage>, ServiceError> {
        found(
            self.products.get_product(product_id).await?,
            "product",
            product_id,
        )?;
        let images = clean_refs("images", images)?;
        if images.is_empty() {
            return Err(ValidationError::field("images", "no images provided").into());
        }
        Ok(self.products.add_product_images(product_id, &images).await?)
    }

    async fn clean_product(&self, input: ProductInput) -> Result<ProductInput, ServiceError> {
        let title = require_text("title", &input.title, MAX_TITLE_LEN)?;
        if self
            .collections
            .get_collection(input.collection_id)
            .await?
            .is_none()
        {
            return Err(does_not_exist("collection_id", input.collection_id).into());
        }
        Ok(ProductInput {
            title,
            description: input.description,
            collection_id: input.collection_id,
        })
    }

    async fn product_detail(&self, product: Product) -> Result<ProductDetail, ServiceError> {
        let mut details = self.product_details(vec![product]).await?;
        details
            .pop()
            .ok_or_else(|| ServiceError::Store(crate::StoreError::Backend("product vanished".into())))
    }

    async fn product_details(
        &self,
        products: Vec<Product>,
    ) -> Result<Vec<ProductDetail>, ServiceError> {
        if products.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = products.iter().map(|p| p.id).collect();
        let variants = self.variants.list_variants(Some(&ids)).await?;
        let mut variants = self.variant_details(variants).await?;
        let mut images = self.products.list_product_images(&ids).await?;

        Ok(products
            .into_iter()
            .map(|product| {
                let (mine, rest): (Vec<_>, Vec<_>) =
                    variants.drain(..).partition(|v| v.product_id == product.id);
                variants = rest;
                let (own_images, rest): (Vec<_>, Vec<_>) =
                    images.drain(..).partition(|i| i.product_id == product.id);
                images = rest;
                ProductDetail {
                    product,
                    variants: mine,
                    images: own_images,
                }
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Variants
    // ------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns a store error on backend failure.
    pub async fn list_variants(
        &self,
        product_id: Option<i64>,
    ) -> Result<Vec<VariantDetail>, ServiceError> {
        let ids = product_id.map(|id| vec![id]);
        let variants = self.variants.list_variants(ids.as_deref()).await?;
        self.variant_details(variants).await
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub async fn get_variant(&self, id: i64) -> Result<VariantDetail, ServiceError> {
        let variant = found(self.variants.get_variant(id).await?, "variant", id)?;
        self.variant_detail(variant).await
    }

    /// Create a variant after checking its attribute selection against the
    /// product's collection.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown product, unknown attribute
    /// values, a duplicate selection, missing required attributes, or
    /// negative stock.
    pub async fn create_variant(&self, input: VariantInput) -> Result<VariantDetail, ServiceError> {
        let record = self.validated_variant(&input).await?;
        let variant = self.variants.create_variant(&record).await?;
        tracing::info!(
            variant_id = variant.id,
            product_id = variant.product_id,
            "variant created"
        );
        self.variant_detail(variant).await
    }

    /// Full replacement of price, stock, and attribute selection. The same
    /// rules as [`Self::create_variant`] apply against the (possibly new)
    /// product.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, or any create-time validation
    /// error.
    pub async fn replace_variant(
        &self,
        id: i64,
        input: VariantInput,
    ) -> Result<VariantDetail, ServiceError> {
        found(self.variants.get_variant(id).await?, "variant", id)?;
        let record = self.validated_variant(&input).await?;
        let variant = self.variants.replace_variant(id, &record).await?;
        self.variant_detail(variant).await
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub async fn delete_variant(&self, id: i64) -> Result<(), ServiceError> {
        Ok(self.variants.delete_variant(id).await?)
    }

    async fn validated_variant(&self, input: &VariantInput) -> Result<VariantRecord, ServiceError> {
        if input.stock < 0 {
            return Err(ValidationError::field(
                "stock",
                "ensure this value is greater than or equal to 0",
            )
            .into());
        }
        let price = validate_price(input.price)?;
        let product = self
            .products
            .get_product(input.product_id)
            .await?
            .ok_or_else(|| does_not_exist("product_id", input.product_id))?;

        let existing = self
            .attributes
            .get_attribute_values(&input.attribute_ids)
            .await?;
        let proposed = resolve_attribute_values(&input.attribute_ids, &existing)?;
        let required = self
            .attributes
            .required_attribute_ids(product.collection_id)
            .await?;
        validate_attribute_selection(&required, &proposed)?;

        Ok(VariantRecord {
            product_id: product.id,
            price,
            stock: input.stock,
            attribute_value_ids: proposed.iter().map(|v| v.id).collect(),
        })
    }

    async fn variant_detail(&self, variant: ProductVariant) -> Result<VariantDetail, ServiceError> {
        let mut details = self.variant_details(vec![variant]).await?;
        details
            .pop()
            .ok_or_else(|| ServiceError::Store(crate::StoreError::Backend("variant vanished".into())))
    }

    async fn variant_details(
        &self,
        variants: Vec<ProductVariant>,
    ) -> Result<Vec<VariantDetail>, ServiceError> {
        let value_ids: Vec<i64> = variants
            .iter()
            .flat_map(|v| v.attribute_value_ids.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let values: HashMap<i64, AttributeValue> = if value_ids.is_empty() {
            HashMap::new()
        } else {
            self.attributes
                .get_attribute_values(&value_ids)
                .await?
                .into_iter()
                .map(|v| (v.id, v))
                .collect()
        };

        Ok(variants
            .into_iter()
            .map(|variant| VariantDetail {
                id: variant.id,
                product_id: variant.product_id,
                attributes: variant
                    .attribute_value_ids
                    .iter()
                    .filter_map(|id| values.get(id).cloned())
                    .collect(),
                price: variant.price,
                stock: variant.stock,
            })
            .collect())
    }
}

fn does_not_exist(field: &'static str, id: i64) -> ValidationError {
    ValidationError::field(field, format!("invalid pk \"{id}\" - object does not exist"))
}

fn optional_ref(
    field: &'static str,
    value: Option<String>,
) -> Result<Option<String>, ValidationError> {
    match value {
        Some(v) if !v.trim().is_empty() => require_text(field, &v, MAX_FILE_REF_LEN).map(Some),
        _ => Ok(None),
    }
}

fn clean_refs(field: &'static str, refs: Vec<String>) -> Result<Vec<String>, ValidationError> {
    refs.iter()
        .map(|r| require_text(field, r, MAX_FILE_REF_LEN))
        .collect()
}
