use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use uuid::Uuid;

use crate::models::{
    IngredientPrice, ItemSource, MIN_QUANTITY, NewIngredientPrice, NewPriceCacheRow,
    NewShoppingListItem, PriceCacheRow, Recipe, RecipeDetail, RecipeIngredient, RecipeStoreCost,
    ShoppingListItem,
};
use crate::pricing::{RecipeCostCalculator, scale_for_servings};
use crate::redistribute::QuantityUpdater;
use crate::stores::store_display_name;

pub struct Database {
    conn: Connection,
}

const ITEM_COLUMNS: &str = "id, user_id, name, quantity, unit, checked, source, recipe_id, \
     recipe_title, price, store_name, category, created_at, updated_at";

const PRICE_COLUMNS: &str = "id, shopping_list_item_id, store, store_name, zip_code, price, \
     product_name, unit_price, cached_at";

const RECIPE_COLUMNS: &str = "id, title, servings, deleted_at, created_at";

fn now() -> String {
    Utc::now().to_rfc3339()
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Run `f` in one transaction; an error rolls back everything it wrote.
    pub fn in_transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    servings REAL NOT NULL DEFAULT 1.0,
                    deleted_at TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipe_ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    quantity REAL NOT NULL,
                    unit TEXT,
                    category TEXT
                );

                CREATE TABLE IF NOT EXISTS shopping_list_items (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    quantity REAL NOT NULL CHECK (quantity >= 1),
                    unit TEXT,
                    checked INTEGER NOT NULL DEFAULT 0,
                    source TEXT NOT NULL CHECK (source IN ('recipe', 'manual')),
                    recipe_id INTEGER REFERENCES recipes(id) ON DELETE SET NULL,
                    recipe_title TEXT,
                    price REAL,
                    store_name TEXT,
                    category TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS price_cache (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    shopping_list_item_id TEXT NOT NULL
                        REFERENCES shopping_list_items(id) ON DELETE CASCADE,
                    store TEXT,
                    store_name TEXT,
                    zip_code TEXT,
                    price REAL,
                    product_name TEXT,
                    unit_price TEXT,
                    cached_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_items_user ON shopping_list_items(user_id);
                CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_recipe ON recipe_ingredients(recipe_id);

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS ingredient_prices (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ingredient_name TEXT NOT NULL,
                    store TEXT NOT NULL,
                    zip_code TEXT,
                    price REAL NOT NULL,
                    product_name TEXT,
                    unit_price TEXT,
                    cached_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_price_cache_item
                    ON price_cache(shopping_list_item_id, cached_at);
                CREATE INDEX IF NOT EXISTS idx_ingredient_prices_lookup
                    ON ingredient_prices(ingredient_name, store, zip_code);

                PRAGMA user_version = 2;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn item_from_row(row: &rusqlite::Row) -> rusqlite::Result<ShoppingListItem> {
        let source: String = row.get(6)?;
        let source = source.parse::<ItemSource>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?;
        Ok(ShoppingListItem {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            quantity: row.get(3)?,
            unit: row.get(4)?,
            checked: row.get(5)?,
            source,
            recipe_id: row.get(7)?,
            recipe_title: row.get(8)?,
            price: row.get(9)?,
            store_name: row.get(10)?,
            category: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn price_from_row(row: &rusqlite::Row) -> rusqlite::Result<PriceCacheRow> {
        Ok(PriceCacheRow {
            id: row.get(0)?,
            shopping_list_item_id: row.get(1)?,
            store: row.get(2)?,
            store_name: row.get(3)?,
            zip_code: row.get(4)?,
            price: row.get(5)?,
            product_name: row.get(6)?,
            unit_price: row.get(7)?,
            cached_at: row.get(8)?,
        })
    }

    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        Ok(Recipe {
            id: row.get(0)?,
            title: row.get(1)?,
            servings: row.get(2)?,
            deleted_at: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<RecipeIngredient> {
        Ok(RecipeIngredient {
            id: row.get(0)?,
            recipe_id: row.get(1)?,
            name: row.get(2)?,
            quantity: row.get(3)?,
            unit: row.get(4)?,
            category: row.get(5)?,
        })
    }

    // --- Shopping list items ---

    pub fn insert_item(&self, item: &NewShoppingListItem) -> Result<ShoppingListItem> {
        let id = Uuid::new_v4().to_string();
        let ts = now();
        self.conn.execute(
            &format!(
                "INSERT INTO shopping_list_items ({ITEM_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)"
            ),
            params![
                id,
                item.user_id,
                item.name.trim(),
                item.quantity.max(MIN_QUANTITY),
                item.unit,
                item.source.as_str(),
                item.recipe_id,
                item.recipe_title,
                item.price,
                item.store_name,
                item.category,
                ts,
            ],
        )?;
        self.get_item(&id)
    }

    pub fn get_item(&self, id: &str) -> Result<ShoppingListItem> {
        self.conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM shopping_list_items WHERE id = ?1"),
                params![id],
                Self::item_from_row,
            )
            .with_context(|| format!("Shopping list item {id} not found"))
    }

    pub fn list_items(&self, user_id: &str) -> Result<Vec<ShoppingListItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM shopping_list_items
             WHERE user_id = ?1 ORDER BY created_at, rowid"
        ))?;
        let rows = stmt.query_map(params![user_id], Self::item_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn touch_item(&self, id: &str, sql: &str, value: &dyn rusqlite::ToSql) -> Result<ShoppingListItem> {
        let changed = self.conn.execute(sql, params![value, now(), id])?;
        if changed == 0 {
            bail!("Shopping list item {id} not found");
        }
        self.get_item(id)
    }

    /// Set a row's quantity, clamped to the floor of 1.
    pub fn update_item_quantity(&self, id: &str, quantity: f64) -> Result<ShoppingListItem> {
        if !quantity.is_finite() {
            bail!("Quantity must be a finite number");
        }
        self.touch_item(
            id,
            "UPDATE shopping_list_items SET quantity = ?1, updated_at = ?2 WHERE id = ?3",
            &quantity.max(MIN_QUANTITY),
        )
    }

    pub fn rename_item(&self, id: &str, name: &str) -> Result<ShoppingListItem> {
        self.touch_item(
            id,
            "UPDATE shopping_list_items SET name = ?1, updated_at = ?2 WHERE id = ?3",
            &name.trim(),
        )
    }

    pub fn set_item_checked(&self, id: &str, checked: bool) -> Result<ShoppingListItem> {
        self.touch_item(
            id,
            "UPDATE shopping_list_items SET checked = ?1, updated_at = ?2 WHERE id = ?3",
            &checked,
        )
    }

    pub fn delete_item(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM shopping_list_items WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn clear_items(&self, user_id: &str) -> Result<usize> {
        let changed = self.conn.execute(
            "DELETE FROM shopping_list_items WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(changed)
    }

    /// Add every ingredient of an active recipe to a user's list as
    /// recipe-sourced rows.
    pub fn add_recipe_to_list(&self, user_id: &str, recipe_id: i64) -> Result<Vec<ShoppingListItem>> {
        let recipe = self
            .get_recipe(recipe_id)?
            .with_context(|| format!("Recipe {recipe_id} not found"))?;
        let ingredients = self.get_recipe_ingredients(recipe_id)?;

        self.in_transaction(|db| {
            let mut added = Vec::with_capacity(ingredients.len());
            for ing in &ingredients {
                added.push(db.insert_item(&NewShoppingListItem {
                    user_id: user_id.to_string(),
                    name: ing.name.clone(),
                    quantity: ing.quantity,
                    unit: ing.unit.clone(),
                    source: ItemSource::Recipe,
                    recipe_id: Some(recipe.id),
                    recipe_title: Some(recipe.title.clone()),
                    price: None,
                    store_name: None,
                    category: ing.category.clone(),
                })?);
            }
            Ok(added)
        })
    }

    // --- Price cache ---

    pub fn insert_price(&self, row: &NewPriceCacheRow) -> Result<PriceCacheRow> {
        let cached_at = row.cached_at.clone().unwrap_or_else(now);
        self.conn
            .execute(
                "INSERT INTO price_cache (shopping_list_item_id, store, store_name, zip_code,
                     price, product_name, unit_price, cached_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    row.shopping_list_item_id,
                    row.store,
                    row.store_name,
                    row.zip_code,
                    row.price,
                    row.product_name,
                    row.unit_price,
                    cached_at,
                ],
            )
            .with_context(|| {
                format!(
                    "Failed to cache price for item {}",
                    row.shopping_list_item_id
                )
            })?;
        let id = self.conn.last_insert_rowid();
        Ok(self.conn.query_row(
            &format!("SELECT {PRICE_COLUMNS} FROM price_cache WHERE id = ?1"),
            params![id],
            Self::price_from_row,
        )?)
    }

    /// Cached rows for the given items, newest first. A ZIP filter keeps only
    /// rows recorded for that ZIP.
    pub fn price_rows_for_items(
        &self,
        item_ids: &[String],
        zip_code: Option<&str>,
    ) -> Result<Vec<PriceCacheRow>> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=item_ids.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!(
            "SELECT {PRICE_COLUMNS} FROM price_cache WHERE shopping_list_item_id IN ({placeholders})"
        );
        let mut values: Vec<&str> = item_ids.iter().map(String::as_str).collect();
        if let Some(zip) = zip_code {
            sql.push_str(&format!(" AND zip_code = ?{}", item_ids.len() + 1));
            values.push(zip);
        }
        sql.push_str(" ORDER BY cached_at DESC, id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), Self::price_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn insert_ingredient_price(&self, price: &NewIngredientPrice) -> Result<IngredientPrice> {
        let cached_at = price.cached_at.clone().unwrap_or_else(now);
        let name = price.ingredient_name.trim().to_lowercase();
        self.conn.execute(
            "INSERT INTO ingredient_prices (ingredient_name, store, zip_code, price,
                 product_name, unit_price, cached_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                name,
                price.store,
                price.zip_code,
                price.price,
                price.product_name,
                price.unit_price,
                cached_at,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(IngredientPrice {
            id,
            ingredient_name: name,
            store: price.store.clone(),
            zip_code: price.zip_code.clone(),
            price: price.price,
            product_name: price.product_name.clone(),
            unit_price: price.unit_price.clone(),
            cached_at,
        })
    }

    /// Latest price for an ingredient at a store. Rows for the exact ZIP win
    /// over rows recorded without one.
    pub fn latest_ingredient_price(
        &self,
        ingredient_name: &str,
        store: &str,
        zip_code: &str,
    ) -> Result<Option<f64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT price FROM ingredient_prices
                 WHERE ingredient_name = ?1 AND store = ?2
                   AND (zip_code = ?3 OR zip_code IS NULL)
                 ORDER BY (zip_code IS NULL), cached_at DESC, id DESC
                 LIMIT 1",
                params![ingredient_name.trim().to_lowercase(), store, zip_code],
                |row| row.get(0),
            )
            .optional()?)
    }

    // --- Recipes ---

    pub fn create_recipe(&self, title: &str, servings: f64) -> Result<Recipe> {
        self.conn.execute(
            "INSERT INTO recipes (title, servings, created_at) VALUES (?1, ?2, ?3)",
            params![title.trim(), servings, now()],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_recipe(id)?
            .with_context(|| format!("Recipe {id} vanished after insert"))
    }

    /// Active (not soft-deleted) recipe by id.
    pub fn get_recipe(&self, id: i64) -> Result<Option<Recipe>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1 AND deleted_at IS NULL"
                ),
                params![id],
                Self::recipe_from_row,
            )
            .optional()?)
    }

    pub fn get_recipe_by_title(&self, title: &str) -> Result<Recipe> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {RECIPE_COLUMNS} FROM recipes
                     WHERE title = ?1 COLLATE NOCASE AND deleted_at IS NULL
                     ORDER BY id LIMIT 1"
                ),
                params![title.trim()],
                Self::recipe_from_row,
            )
            .optional()?
            .with_context(|| format!("Recipe '{title}' not found"))
    }

    pub fn list_recipes(&self) -> Result<Vec<Recipe>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE deleted_at IS NULL ORDER BY title"
        ))?;
        let rows = stmt.query_map([], Self::recipe_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn add_recipe_ingredient(
        &self,
        recipe_id: i64,
        name: &str,
        quantity: f64,
        unit: Option<&str>,
        category: Option<&str>,
    ) -> Result<RecipeIngredient> {
        if self.get_recipe(recipe_id)?.is_none() {
            bail!("Recipe {recipe_id} not found");
        }
        self.conn.execute(
            "INSERT INTO recipe_ingredients (recipe_id, name, quantity, unit, category)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![recipe_id, name.trim(), quantity, unit, category],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(self.conn.query_row(
            "SELECT id, recipe_id, name, quantity, unit, category
             FROM recipe_ingredients WHERE id = ?1",
            params![id],
            Self::ingredient_from_row,
        )?)
    }

    pub fn get_recipe_ingredients(&self, recipe_id: i64) -> Result<Vec<RecipeIngredient>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, recipe_id, name, quantity, unit, category
             FROM recipe_ingredients WHERE recipe_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![recipe_id], Self::ingredient_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_recipe_detail(&self, recipe_id: i64) -> Result<Option<RecipeDetail>> {
        let Some(recipe) = self.get_recipe(recipe_id)? else {
            return Ok(None);
        };
        let ingredients = self.get_recipe_ingredients(recipe_id)?;
        Ok(Some(RecipeDetail {
            recipe,
            ingredients,
        }))
    }

    /// Mark a recipe deleted. List rows created from it keep their link.
    pub fn soft_delete_recipe(&self, recipe_id: i64) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE recipes SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![now(), recipe_id],
        )?;
        Ok(changed > 0)
    }
}

impl QuantityUpdater for Database {
    fn update_quantity(&self, id: &str, quantity: f64) -> Result<()> {
        self.update_item_quantity(id, quantity).map(|_| ())
    }
}

impl RecipeCostCalculator for Database {
    fn store_cost(
        &self,
        recipe: &Recipe,
        store: &str,
        zip_code: &str,
        servings: u32,
    ) -> Result<RecipeStoreCost> {
        let ingredients = self.get_recipe_ingredients(recipe.id)?;
        let mut total = 0.0;
        let mut matched_items = 0;
        for ing in &ingredients {
            if let Some(price) = self.latest_ingredient_price(&ing.name, store, zip_code)? {
                total += price * scale_for_servings(ing.quantity, recipe.servings, servings);
                matched_items += 1;
            }
        }
        Ok(RecipeStoreCost {
            store: store.to_string(),
            store_name: store_display_name(store),
            total,
            matched_items,
            total_items: ingredients.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual(db: &Database, name: &str, quantity: f64) -> ShoppingListItem {
        db.insert_item(&NewShoppingListItem::manual("u1", name, quantity))
            .unwrap()
    }

    fn price(item_id: &str, store: &str, price: f64, zip: Option<&str>, at: &str) -> NewPriceCacheRow {
        NewPriceCacheRow {
            shopping_list_item_id: item_id.to_string(),
            store: Some(store.to_string()),
            store_name: None,
            zip_code: zip.map(String::from),
            price: Some(price),
            product_name: None,
            unit_price: None,
            cached_at: Some(at.to_string()),
        }
    }

    fn ingredient_price(name: &str, store: &str, price: f64, zip: Option<&str>, at: &str) -> NewIngredientPrice {
        NewIngredientPrice {
            ingredient_name: name.to_string(),
            store: store.to_string(),
            zip_code: zip.map(String::from),
            price,
            product_name: None,
            unit_price: None,
            cached_at: Some(at.to_string()),
        }
    }

    #[test]
    fn test_insert_and_get_item() {
        let db = Database::open_in_memory().unwrap();
        let item = manual(&db, "  Milk ", 2.0);
        assert_eq!(item.name, "Milk");
        assert_eq!(item.source, ItemSource::Manual);
        assert!(!item.checked);
        assert!(Uuid::parse_str(&item.id).is_ok());

        let fetched = db.get_item(&item.id).unwrap();
        assert_eq!(fetched, item);
    }

    #[test]
    fn test_insert_clamps_quantity() {
        let db = Database::open_in_memory().unwrap();
        let item = manual(&db, "Milk", 0.25);
        assert!((item.quantity - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_get_missing_item() {
        let db = Database::open_in_memory().unwrap();
        let err = db.get_item("nope").unwrap_err();
        assert!(format!("{err:#}").contains("nope"));
    }

    #[test]
    fn test_list_items_scoped_to_user() {
        let db = Database::open_in_memory().unwrap();
        manual(&db, "Milk", 1.0);
        manual(&db, "Eggs", 1.0);
        db.insert_item(&NewShoppingListItem::manual("u2", "Tea", 1.0))
            .unwrap();
        let items = db.list_items("u1").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Milk");
        assert_eq!(items[1].name, "Eggs");
    }

    #[test]
    fn test_update_quantity_clamps() {
        let db = Database::open_in_memory().unwrap();
        let item = manual(&db, "Milk", 3.0);
        let updated = db.update_item_quantity(&item.id, 0.0).unwrap();
        assert!((updated.quantity - 1.0).abs() < f64::EPSILON);
        let updated = db.update_item_quantity(&item.id, 4.5).unwrap();
        assert!((updated.quantity - 4.5).abs() < f64::EPSILON);
        assert!(db.update_item_quantity(&item.id, f64::NAN).is_err());
        assert!(db.update_item_quantity("missing", 2.0).is_err());
    }

    #[test]
    fn test_rename_and_check() {
        let db = Database::open_in_memory().unwrap();
        let item = manual(&db, "Milk", 1.0);
        let renamed = db.rename_item(&item.id, "Oat milk").unwrap();
        assert_eq!(renamed.name, "Oat milk");
        let checked = db.set_item_checked(&item.id, true).unwrap();
        assert!(checked.checked);
        let unchecked = db.set_item_checked(&item.id, false).unwrap();
        assert!(!unchecked.checked);
    }

    #[test]
    fn test_delete_and_clear() {
        let db = Database::open_in_memory().unwrap();
        let a = manual(&db, "Milk", 1.0);
        manual(&db, "Eggs", 1.0);
        manual(&db, "Bread", 1.0);
        assert!(db.delete_item(&a.id).unwrap());
        assert!(!db.delete_item(&a.id).unwrap());
        assert_eq!(db.clear_items("u1").unwrap(), 2);
        assert!(db.list_items("u1").unwrap().is_empty());
    }

    #[test]
    fn test_delete_item_cascades_prices() {
        let db = Database::open_in_memory().unwrap();
        let item = manual(&db, "Milk", 1.0);
        db.insert_price(&price(&item.id, "walmart", 3.0, None, "2024-06-01T00:00:00Z"))
            .unwrap();
        db.delete_item(&item.id).unwrap();
        let rows = db.price_rows_for_items(&[item.id], None).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_price_rows_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let item = manual(&db, "Milk", 1.0);
        db.insert_price(&price(&item.id, "walmart", 3.0, None, "2024-06-01T00:00:00Z"))
            .unwrap();
        db.insert_price(&price(&item.id, "walmart", 3.5, None, "2024-06-03T00:00:00Z"))
            .unwrap();
        db.insert_price(&price(&item.id, "target", 4.0, None, "2024-06-02T00:00:00Z"))
            .unwrap();
        let rows = db.price_rows_for_items(&[item.id.clone()], None).unwrap();
        let prices: Vec<Option<f64>> = rows.iter().map(|r| r.price).collect();
        assert_eq!(prices, vec![Some(3.5), Some(4.0), Some(3.0)]);
    }

    #[test]
    fn test_price_rows_zip_filter() {
        let db = Database::open_in_memory().unwrap();
        let item = manual(&db, "Milk", 1.0);
        db.insert_price(&price(&item.id, "walmart", 3.0, Some("47906"), "2024-06-01T00:00:00Z"))
            .unwrap();
        db.insert_price(&price(&item.id, "walmart", 9.0, Some("94110"), "2024-06-02T00:00:00Z"))
            .unwrap();
        let rows = db
            .price_rows_for_items(&[item.id.clone()], Some("47906"))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].price, Some(3.0));
        assert!(db.price_rows_for_items(&[], None).unwrap().is_empty());
    }

    #[test]
    fn test_price_requires_existing_item() {
        let db = Database::open_in_memory().unwrap();
        assert!(db
            .insert_price(&price("ghost", "walmart", 1.0, None, "2024-06-01T00:00:00Z"))
            .is_err());
    }

    #[test]
    fn test_recipe_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe("Fried rice", 2.0).unwrap();
        db.add_recipe_ingredient(recipe.id, "Rice", 2.0, Some("cup"), Some("grains"))
            .unwrap();
        db.add_recipe_ingredient(recipe.id, "Eggs", 3.0, None, None)
            .unwrap();

        let detail = db.get_recipe_detail(recipe.id).unwrap().unwrap();
        assert_eq!(detail.ingredients.len(), 2);
        assert_eq!(db.get_recipe_by_title("fried RICE").unwrap().id, recipe.id);

        assert!(db.soft_delete_recipe(recipe.id).unwrap());
        assert!(!db.soft_delete_recipe(recipe.id).unwrap());
        assert!(db.get_recipe(recipe.id).unwrap().is_none());
        assert!(db.get_recipe_by_title("Fried rice").is_err());
        assert!(db.list_recipes().unwrap().is_empty());
        assert!(db
            .add_recipe_ingredient(recipe.id, "Soy sauce", 1.0, None, None)
            .is_err());
    }

    #[test]
    fn test_add_recipe_to_list() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe("Omelette", 1.0).unwrap();
        db.add_recipe_ingredient(recipe.id, "Eggs", 3.0, None, Some("dairy"))
            .unwrap();
        db.add_recipe_ingredient(recipe.id, "Butter", 0.5, Some("tbsp"), None)
            .unwrap();

        let added = db.add_recipe_to_list("u1", recipe.id).unwrap();
        assert_eq!(added.len(), 2);
        assert!(added.iter().all(|i| i.source == ItemSource::Recipe));
        assert_eq!(added[0].recipe_title.as_deref(), Some("Omelette"));
        // below-floor ingredient amounts are clamped on the list
        assert!((added[1].quantity - 1.0).abs() < f64::EPSILON);
        assert!(db.add_recipe_to_list("u1", 999).is_err());
    }

    #[test]
    fn test_latest_ingredient_price_prefers_exact_zip() {
        let db = Database::open_in_memory().unwrap();
        db.insert_ingredient_price(&ingredient_price("Eggs", "walmart", 3.0, None, "2024-06-05T00:00:00Z"))
            .unwrap();
        db.insert_ingredient_price(&ingredient_price("eggs", "walmart", 2.5, Some("47906"), "2024-06-01T00:00:00Z"))
            .unwrap();
        let found = db.latest_ingredient_price("EGGS", "walmart", "47906").unwrap();
        assert_eq!(found, Some(2.5));
        let fallback = db.latest_ingredient_price("eggs", "walmart", "10001").unwrap();
        assert_eq!(fallback, Some(3.0));
        assert_eq!(db.latest_ingredient_price("eggs", "target", "47906").unwrap(), None);
    }

    #[test]
    fn test_store_cost_scales_servings() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe("Omelette", 2.0).unwrap();
        db.add_recipe_ingredient(recipe.id, "Eggs", 4.0, None, None)
            .unwrap();
        db.add_recipe_ingredient(recipe.id, "Chives", 1.0, None, None)
            .unwrap();
        db.insert_ingredient_price(&ingredient_price("eggs", "aldi", 0.5, None, "2024-06-01T00:00:00Z"))
            .unwrap();

        let cost = db.store_cost(&recipe, "aldi", "47906", 4).unwrap();
        // 4 eggs for 2 servings, scaled to 4 servings = 8 eggs at 0.50
        assert!((cost.total - 4.0).abs() < 1e-9);
        assert_eq!(cost.matched_items, 1);
        assert_eq!(cost.total_items, 2);
        assert_eq!(cost.store_name, "Aldi");
    }

    #[test]
    fn test_open_on_disk_migrates_once() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("basket.db");
        {
            let db = Database::open(&path).unwrap();
            manual(&db, "Milk", 1.0);
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.list_items("u1").unwrap().len(), 1);
    }
}
