use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
};
use serde::{Deserialize, Serialize};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use basket_core::merge::{ViewMode, find_merged};
use basket_core::models::{
    ComparisonItem, IngredientPrice, ItemSource, NewIngredientPrice, NewPriceCacheRow,
    NewShoppingListItem, PriceCacheRow, RecipeDetail, RecipeIngredient, ShoppingListItem,
    StoreComparison, validate_item_name, validate_price, validate_quantity, validate_servings,
};
use basket_core::redistribute::QuantityUpdate;
use basket_core::service::{ListView, ShoppingService};
use basket_core::stores::{canonical_store_key, canonicalize, normalize_zip, store_display_name};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<ShoppingService>>,
    api_key: Option<String>,
}

impl AppState {
    fn service(&self) -> MutexGuard<'_, ShoppingService> {
        self.service.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct ListQuery {
    view: Option<String>,
}

#[derive(Deserialize)]
struct CreateItemRequest {
    name: String,
    quantity: Option<f64>,
    unit: Option<String>,
    category: Option<String>,
    price: Option<f64>,
    store_name: Option<String>,
    #[serde(default = "default_source")]
    source: ItemSource,
    recipe_id: Option<i64>,
    recipe_title: Option<String>,
}

fn default_source() -> ItemSource {
    ItemSource::Manual
}

#[derive(Deserialize)]
struct UpdateItemRequest {
    quantity: Option<f64>,
    name: Option<String>,
    checked: Option<bool>,
}

#[derive(Deserialize)]
struct MergedQuantityRequest {
    quantity: f64,
}

#[derive(Serialize)]
struct RedistributionResponse {
    name: String,
    previous_total: f64,
    requested_total: f64,
    applied_total: f64,
    /// Part of a decrease the per-row minimum kept from being applied.
    unabsorbed: f64,
    updates: Vec<QuantityUpdate>,
}

#[derive(Deserialize)]
struct CreateIngredientRequest {
    name: String,
    quantity: f64,
    unit: Option<String>,
    category: Option<String>,
}

#[derive(Deserialize)]
struct CreateRecipeRequest {
    title: String,
    #[serde(default = "default_recipe_servings")]
    servings: f64,
    #[serde(default)]
    ingredients: Vec<CreateIngredientRequest>,
}

fn default_recipe_servings() -> f64 {
    1.0
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComparePricesRequest {
    #[serde(default)]
    items: Vec<ComparisonItem>,
    zip_code: Option<String>,
}

#[derive(Serialize)]
struct ComparePricesResponse {
    results: Vec<StoreComparison>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecipePricingQuery {
    recipe_id: Option<String>,
    zip_code: Option<String>,
    servings: Option<String>,
    stores: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// Price cache or ingredient price query failed.
    Lookup(anyhow::Error),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            Self::Lookup(err) => {
                tracing::error!(error = %format!("{err:#}"), "price lookup failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to look up prices".to_string(),
                    None,
                )
            }
            Self::Internal(err) => {
                let details = format!("{err:#}");
                tracing::error!(error = %details, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    Some(details),
                )
            }
        };
        (status, Json(ErrorResponse { error, details })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

fn bad_request(err: &anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err}"))
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                    details: None,
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- List handlers ---

async fn list_items(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListView>, ApiError> {
    let mode = match query.view.as_deref() {
        Some(raw) => raw.parse::<ViewMode>().map_err(|e| bad_request(&e))?,
        None => ViewMode::default(),
    };
    let view = state
        .service()
        .list_view(&user, mode)
        .context("failed to load shopping list")?;
    Ok(Json(view))
}

async fn create_item(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(req): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<ShoppingListItem>), ApiError> {
    let name = validate_item_name(&req.name).map_err(|e| bad_request(&e))?;
    let quantity = req.quantity.unwrap_or(1.0);
    validate_quantity(quantity).map_err(|e| bad_request(&e))?;
    if let Some(price) = req.price {
        validate_price(price).map_err(|e| bad_request(&e))?;
    }

    let service = state.service();
    let item = service
        .db()
        .insert_item(&NewShoppingListItem {
            user_id: user,
            name,
            quantity,
            unit: req.unit,
            source: req.source,
            recipe_id: req.recipe_id,
            recipe_title: req.recipe_title,
            price: req.price,
            store_name: req.store_name,
            category: req.category,
        })
        .context("failed to insert shopping list item")?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn clear_items(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = state
        .service()
        .db()
        .clear_items(&user)
        .context("failed to clear shopping list")?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<ShoppingListItem>, ApiError> {
    if req.quantity.is_none() && req.name.is_none() && req.checked.is_none() {
        return Err(ApiError::BadRequest(
            "At least one field must be provided".to_string(),
        ));
    }
    if let Some(quantity) = req.quantity {
        validate_quantity(quantity).map_err(|e| bad_request(&e))?;
    }
    let name = req
        .name
        .as_deref()
        .map(validate_item_name)
        .transpose()
        .map_err(|e| bad_request(&e))?;

    let service = state.service();
    let db = service.db();
    let mut item = db
        .get_item(&id)
        .map_err(|_| ApiError::NotFound(format!("Item {id} not found")))?;

    if let Some(quantity) = req.quantity {
        item = db
            .update_item_quantity(&id, quantity)
            .context("failed to update quantity")?;
    }
    if let Some(name) = name {
        item = db.rename_item(&id, &name).context("failed to rename item")?;
    }
    if let Some(checked) = req.checked {
        item = db
            .set_item_checked(&id, checked)
            .context("failed to update checked state")?;
    }
    Ok(Json(item))
}

async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .service()
        .db()
        .delete_item(&id)
        .context("failed to delete item")?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Item {id} not found")))
    }
}

async fn set_merged_quantity(
    State(state): State<AppState>,
    Path((user, name)): Path<(String, String)>,
    Json(req): Json<MergedQuantityRequest>,
) -> Result<Json<RedistributionResponse>, ApiError> {
    if !req.quantity.is_finite() {
        return Err(ApiError::BadRequest(
            "quantity must be a finite number".to_string(),
        ));
    }

    let service = state.service();
    let items = service
        .db()
        .list_items(&user)
        .context("failed to load shopping list")?;
    if find_merged(&items, &name).is_none() {
        return Err(ApiError::NotFound(format!(
            "No item named '{}' on the list",
            name.trim()
        )));
    }

    let plan = service.set_merged_quantity(&user, &name, req.quantity)?;
    Ok(Json(RedistributionResponse {
        name: name.trim().to_string(),
        previous_total: plan.previous_total,
        requested_total: plan.requested_total,
        applied_total: plan.applied_total,
        unabsorbed: plan.shortfall(),
        updates: plan.updates,
    }))
}

async fn shop_recipe(
    State(state): State<AppState>,
    Path((user, recipe_id)): Path<(String, i64)>,
) -> Result<(StatusCode, Json<Vec<ShoppingListItem>>), ApiError> {
    let service = state.service();
    let db = service.db();
    if db.get_recipe(recipe_id).context("failed to load recipe")?.is_none() {
        return Err(ApiError::NotFound(format!("Recipe {recipe_id} not found")));
    }
    let added = db
        .add_recipe_to_list(&user, recipe_id)
        .context("failed to add recipe to list")?;
    Ok((StatusCode::CREATED, Json(added)))
}

// --- Recipe handlers ---

fn validate_ingredient(req: &CreateIngredientRequest) -> Result<String, ApiError> {
    let name = validate_item_name(&req.name).map_err(|e| bad_request(&e))?;
    validate_quantity(req.quantity).map_err(|e| bad_request(&e))?;
    Ok(name)
}

async fn create_recipe(
    State(state): State<AppState>,
    Json(req): Json<CreateRecipeRequest>,
) -> Result<(StatusCode, Json<RecipeDetail>), ApiError> {
    let title = validate_item_name(&req.title)
        .map_err(|_| ApiError::BadRequest("title must not be empty".to_string()))?;
    validate_servings(req.servings).map_err(|e| bad_request(&e))?;
    let names = req
        .ingredients
        .iter()
        .map(validate_ingredient)
        .collect::<Result<Vec<_>, _>>()?;

    let service = state.service();
    let db = service.db();
    let recipe = db
        .create_recipe(&title, req.servings)
        .context("failed to create recipe")?;
    for (ing, name) in req.ingredients.iter().zip(&names) {
        db.add_recipe_ingredient(
            recipe.id,
            name,
            ing.quantity,
            ing.unit.as_deref(),
            ing.category.as_deref(),
        )
        .context("failed to add ingredient")?;
    }
    let detail = db
        .get_recipe_detail(recipe.id)?
        .context("recipe vanished after insert")?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn list_recipes(
    State(state): State<AppState>,
) -> Result<Json<Vec<basket_core::models::Recipe>>, ApiError> {
    let recipes = state
        .service()
        .db()
        .list_recipes()
        .context("failed to list recipes")?;
    Ok(Json(recipes))
}

async fn get_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RecipeDetail>, ApiError> {
    state
        .service()
        .db()
        .get_recipe_detail(id)
        .context("failed to load recipe")?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Recipe {id} not found")))
}

async fn delete_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .service()
        .db()
        .soft_delete_recipe(id)
        .context("failed to delete recipe")?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Recipe {id} not found")))
    }
}

async fn add_recipe_ingredient(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<CreateIngredientRequest>,
) -> Result<(StatusCode, Json<RecipeIngredient>), ApiError> {
    let name = validate_ingredient(&req)?;
    let service = state.service();
    let db = service.db();
    if db.get_recipe(id).context("failed to load recipe")?.is_none() {
        return Err(ApiError::NotFound(format!("Recipe {id} not found")));
    }
    let ingredient = db
        .add_recipe_ingredient(
            id,
            &name,
            req.quantity,
            req.unit.as_deref(),
            req.category.as_deref(),
        )
        .context("failed to add ingredient")?;
    Ok((StatusCode::CREATED, Json(ingredient)))
}

// --- Price handlers ---

/// Written prices are keyed the way recipe pricing and comparisons look them
/// up, so a key like "Whole Foods" lands on `wholefoods`.
fn required_store(key: Option<&str>, name: Option<&str>) -> Result<String, ApiError> {
    key.map(str::trim)
        .filter(|k| !k.is_empty())
        .map_or_else(|| canonical_store_key(None, name), canonicalize)
        .ok_or_else(|| ApiError::BadRequest("store or store_name is required".to_string()))
}

async fn create_price(
    State(state): State<AppState>,
    Json(mut req): Json<NewPriceCacheRow>,
) -> Result<(StatusCode, Json<PriceCacheRow>), ApiError> {
    let store = required_store(req.store.as_deref(), req.store_name.as_deref())?;
    if let Some(price) = req.price {
        validate_price(price).map_err(|e| bad_request(&e))?;
    }
    req.store_name = req.store_name.or_else(|| Some(store_display_name(&store)));
    req.store = Some(store);
    req.zip_code = req.zip_code.as_deref().and_then(normalize_zip);

    let service = state.service();
    let db = service.db();
    db.get_item(&req.shopping_list_item_id).map_err(|_| {
        ApiError::BadRequest(format!(
            "Item with id {} not found",
            req.shopping_list_item_id
        ))
    })?;
    let row = db.insert_price(&req).context("failed to cache price")?;
    Ok((StatusCode::CREATED, Json(row)))
}

async fn create_ingredient_price(
    State(state): State<AppState>,
    Json(mut req): Json<NewIngredientPrice>,
) -> Result<(StatusCode, Json<IngredientPrice>), ApiError> {
    validate_item_name(&req.ingredient_name).map_err(|e| bad_request(&e))?;
    validate_price(req.price).map_err(|e| bad_request(&e))?;
    req.store = required_store(Some(&req.store), None)?;
    req.zip_code = req.zip_code.as_deref().and_then(normalize_zip);

    let row = state
        .service()
        .db()
        .insert_ingredient_price(&req)
        .context("failed to save ingredient price")?;
    Ok((StatusCode::CREATED, Json(row)))
}

async fn compare_prices(
    State(state): State<AppState>,
    Json(req): Json<ComparePricesRequest>,
) -> Result<Json<ComparePricesResponse>, ApiError> {
    let results = state
        .service()
        .compare_prices(req.items, req.zip_code.as_deref())
        .map_err(ApiError::Lookup)?;
    Ok(Json(ComparePricesResponse { results }))
}

async fn recipe_pricing(
    State(state): State<AppState>,
    Query(query): Query<RecipePricingQuery>,
) -> Result<Json<basket_core::models::RecipePricing>, ApiError> {
    let raw_id = query
        .recipe_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("recipeId is required".to_string()))?;
    let recipe_id: i64 = raw_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("recipeId must be an integer, got '{raw_id}'")))?;

    let pricing = state
        .service()
        .price_recipe(
            recipe_id,
            query.zip_code.as_deref(),
            query.servings.as_deref(),
            query.stores.as_deref(),
        )
        .map_err(ApiError::Lookup)?;

    pricing
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Recipe {recipe_id} not found")))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/users/{user}/items",
            get(list_items).post(create_item).delete(clear_items),
        )
        .route("/api/items/{id}", patch(update_item).delete(delete_item))
        .route("/api/users/{user}/merged/{name}", put(set_merged_quantity))
        .route("/api/users/{user}/recipes/{id}/shop", post(shop_recipe))
        .route("/api/recipes", post(create_recipe).get(list_recipes))
        .route("/api/recipes/{id}", get(get_recipe).delete(delete_recipe))
        .route("/api/recipes/{id}/ingredients", post(add_recipe_ingredient))
        .route("/api/prices", post(create_price))
        .route("/api/ingredient-prices", post(create_ingredient_price))
        .route("/api/compare-prices", post(compare_prices))
        .route("/api/recipe-pricing", get(recipe_pricing))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Server startup ---

/// First and last four characters of the key; short or hand-edited keys are masked whole.
fn key_hint(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

pub async fn start_server(
    service: ShoppingService,
    port: u16,
    bind: &str,
    api_key: Option<String>,
    new_api_key: bool,
) -> anyhow::Result<()> {
    let state = AppState {
        service: Arc::new(Mutex::new(service)),
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        if new_api_key {
            eprintln!("Generated new API key: {key}");
            eprintln!("Include in requests: Authorization: Bearer {key}");
        } else {
            eprintln!(
                "API key: {} (see api_key file in data directory)",
                key_hint(key)
            );
        }
    } else {
        tracing::warn!("authentication disabled (--no-auth); the API is open to anyone");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        tracing::warn!(
            bind,
            "listening with no authentication; any device on your network can access this API"
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    tracing::info!("listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state(api_key: Option<String>) -> AppState {
        AppState {
            service: Arc::new(Mutex::new(ShoppingService::new_in_memory().unwrap())),
            api_key,
        }
    }

    fn test_app(api_key: Option<String>) -> Router {
        build_router(test_state(api_key))
    }

    async fn send(app: Router, request: axum::http::Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    fn get(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri).body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn add_item(state: &AppState, name: &str, quantity: f64, source: ItemSource) -> String {
        let mut item = NewShoppingListItem::manual("u1", name, quantity);
        item.source = source;
        state.service().db().insert_item(&item).unwrap().id
    }

    fn cache_price(state: &AppState, item_id: &str, store: &str, price: f64) {
        state
            .service()
            .db()
            .insert_price(&NewPriceCacheRow {
                shopping_list_item_id: item_id.to_string(),
                store: Some(store.to_string()),
                store_name: None,
                zip_code: Some("47906".to_string()),
                price: Some(price),
                product_name: None,
                unit_price: None,
                cached_at: None,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn auth_missing_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));
        let (status, json) = send(app, get("/api/recipes")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Invalid or missing API key");
    }

    #[tokio::test]
    async fn auth_wrong_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));
        let request = axum::http::Request::get("/api/recipes")
            .header("Authorization", "Bearer wrong-key")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_correct_key_succeeds() {
        let app = test_app(Some("test-key-abc123".to_string()));
        let request = axum::http::Request::get("/api/recipes")
            .header("Authorization", "Bearer test-key-abc123")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn security_headers_on_auth_failure() {
        let app = test_app(Some("secret".to_string()));
        let response = app.oneshot(get("/api/recipes")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn create_and_list_items_in_both_views() {
        let state = test_state(None);
        let app = build_router(state.clone());

        let (status, item) = send(
            app.clone(),
            json_request("POST", "/api/users/u1/items", &serde_json::json!({ "name": " Eggs ", "quantity": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(item["name"], "Eggs");
        add_item(&state, "eggs", 1.0, ItemSource::Recipe);

        let (status, view) = send(app.clone(), get("/api/users/u1/items?view=ungrouped")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["view"], "ungrouped");
        assert_eq!(view["rows"].as_array().unwrap().len(), 1);
        assert_eq!(view["rows"][0]["quantity"], 3.0);

        let (_, view) = send(app.clone(), get("/api/users/u1/items")).await;
        assert_eq!(view["view"], "grouped");

        let (status, _) = send(app, get("/api/users/u1/items?view=sideways")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_item_rejects_bad_input() {
        let app = test_app(None);
        let (status, _) = send(
            app.clone(),
            json_request("POST", "/api/users/u1/items", &serde_json::json!({ "name": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            app,
            json_request("POST", "/api/users/u1/items", &serde_json::json!({ "name": "Milk", "quantity": -1 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn patch_item_fields() {
        let state = test_state(None);
        let id = add_item(&state, "Milk", 1.0, ItemSource::Manual);
        let app = build_router(state);

        let (status, item) = send(
            app.clone(),
            json_request(
                "PATCH",
                &format!("/api/items/{id}"),
                &serde_json::json!({ "quantity": 3, "checked": true, "name": "Oat milk" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(item["quantity"], 3.0);
        assert_eq!(item["checked"], true);
        assert_eq!(item["name"], "Oat milk");

        let (status, _) = send(
            app.clone(),
            json_request("PATCH", &format!("/api/items/{id}"), &serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            app,
            json_request("PATCH", "/api/items/nope", &serde_json::json!({ "checked": true })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_item_then_404() {
        let state = test_state(None);
        let id = add_item(&state, "Milk", 1.0, ItemSource::Manual);
        let app = build_router(state);
        let delete = |uri: String| axum::http::Request::delete(uri).body(Body::empty()).unwrap();

        let (status, _) = send(app.clone(), delete(format!("/api/items/{id}"))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(app, delete(format!("/api/items/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn merged_quantity_reports_unabsorbed() {
        let state = test_state(None);
        add_item(&state, "Eggs", 2.0, ItemSource::Recipe);
        add_item(&state, "eggs", 2.0, ItemSource::Manual);
        let app = build_router(state.clone());

        let (status, report) = send(
            app.clone(),
            json_request("PUT", "/api/users/u1/merged/EGGS", &serde_json::json!({ "quantity": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["previous_total"], 4.0);
        assert_eq!(report["applied_total"], 2.0);
        assert_eq!(report["unabsorbed"], 1.0);

        let items = state.service().db().list_items("u1").unwrap();
        assert!(items.iter().all(|i| i.quantity >= 1.0));

        let (status, _) = send(
            app,
            json_request("PUT", "/api/users/u1/merged/caviar", &serde_json::json!({ "quantity": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn compare_prices_eggs_and_bread() {
        let state = test_state(None);
        let eggs = add_item(&state, "Eggs", 2.0, ItemSource::Manual);
        let bread = add_item(&state, "Bread", 1.0, ItemSource::Manual);
        cache_price(&state, &eggs, "walmart", 3.0);
        cache_price(&state, &bread, "walmart", 2.5);
        cache_price(&state, &bread, "target", 4.0);
        let app = build_router(state);

        let body = serde_json::json!({
            "items": [
                { "id": eggs, "name": "Eggs", "quantity": 2 },
                { "id": bread, "name": "Bread", "quantity": 1 },
            ],
            "zipCode": "47906"
        });
        let (status, json) = send(app, json_request("POST", "/api/compare-prices", &body)).await;
        assert_eq!(status, StatusCode::OK);

        let results = json["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        let walmart = results.iter().find(|r| r["store"] == "walmart").unwrap();
        let target = results.iter().find(|r| r["store"] == "target").unwrap();
        assert_eq!(walmart["total"], 8.5);
        assert_eq!(walmart["savings"], 0.0);
        assert_eq!(target["total"], 4.0);
        assert_eq!(target["savings"], 4.5);
        assert_eq!(target["missingItems"][0]["name"], "Eggs");
    }

    #[tokio::test]
    async fn recipe_pricing_validation() {
        let app = test_app(None);

        let (status, json) = send(app.clone(), get("/api/recipe-pricing")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "recipeId is required");

        let (status, _) = send(app.clone(), get("/api/recipe-pricing?recipeId=abc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(app, get("/api/recipe-pricing?recipeId=999")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn recipe_pricing_ranks_stores() {
        let app = test_app(None);

        let (status, detail) = send(
            app.clone(),
            json_request(
                "POST",
                "/api/recipes",
                &serde_json::json!({
                    "title": "Rice bowl",
                    "servings": 2,
                    "ingredients": [
                        { "name": "Rice", "quantity": 1 },
                        { "name": "Egg", "quantity": 2 },
                    ]
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let recipe_id = detail["id"].as_i64().unwrap();

        for (name, store, price) in [("rice", "aldi", 1.5), ("egg", "aldi", 0.5), ("rice", "ranch99", 1.0)] {
            let (status, _) = send(
                app.clone(),
                json_request(
                    "POST",
                    "/api/ingredient-prices",
                    &serde_json::json!({
                        "ingredient_name": name,
                        "store": store,
                        "zip_code": "47906",
                        "price": price,
                    }),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, pricing) = send(
            app.clone(),
            get(&format!("/api/recipe-pricing?recipeId={recipe_id}&servings=2&stores=aldi,ranch99,nowhere")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pricing["recipeName"], "Rice bowl");
        assert_eq!(pricing["zipCode"], "47906");
        assert_eq!(pricing["cheapest"]["store"], "99ranch");
        assert_eq!(pricing["stores"].as_array().unwrap().len(), 2);
        assert_eq!(pricing["totalIngredients"], 2);
        assert_eq!(pricing["pricedIngredients"], 1);
        assert_eq!(pricing["isComplete"], false);

        let delete = axum::http::Request::delete(format!("/api/recipes/{recipe_id}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app.clone(), delete).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(app, get(&format!("/api/recipe-pricing?recipeId={recipe_id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn shop_recipe_adds_recipe_rows() {
        let state = test_state(None);
        let recipe = {
            let service = state.service();
            let recipe = service.db().create_recipe("Toast", 1.0).unwrap();
            service
                .db()
                .add_recipe_ingredient(recipe.id, "Bread", 2.0, None, None)
                .unwrap();
            recipe
        };
        let app = build_router(state);

        let post_empty = |uri: String| axum::http::Request::post(uri).body(Body::empty()).unwrap();
        let (status, added) = send(
            app.clone(),
            post_empty(format!("/api/users/u1/recipes/{}/shop", recipe.id)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(added[0]["source"], "recipe");
        assert_eq!(added[0]["recipe_title"], "Toast");

        let (status, _) = send(app, post_empty("/api/users/u1/recipes/999/shop".to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_price_requires_known_item_and_store() {
        let state = test_state(None);
        let id = add_item(&state, "Milk", 1.0, ItemSource::Manual);
        let app = build_router(state);

        let (status, row) = send(
            app.clone(),
            json_request(
                "POST",
                "/api/prices",
                &serde_json::json!({
                    "shopping_list_item_id": id,
                    "store_name": "Trader Joe's Market",
                    "zip_code": "47906-0001",
                    "price": 3.29,
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(row["store"], "traderjoes");
        assert_eq!(row["zip_code"], "47906");

        let (status, _) = send(
            app.clone(),
            json_request(
                "POST",
                "/api/prices",
                &serde_json::json!({ "shopping_list_item_id": id, "price": 1.0 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            app,
            json_request(
                "POST",
                "/api/prices",
                &serde_json::json!({ "shopping_list_item_id": "ghost", "store": "aldi", "price": 1.0 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn written_store_names_match_the_pricing_keys() {
        let state = test_state(None);
        let id = add_item(&state, "Milk", 1.0, ItemSource::Manual);
        let app = build_router(state);

        let (status, row) = send(
            app.clone(),
            json_request(
                "POST",
                "/api/prices",
                &serde_json::json!({ "shopping_list_item_id": id, "store": "Whole Foods", "price": 4.0 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(row["store"], "wholefoods");

        let (status, detail) = send(
            app.clone(),
            json_request(
                "POST",
                "/api/recipes",
                &serde_json::json!({
                    "title": "Cereal",
                    "servings": 2,
                    "ingredients": [{ "name": "Milk", "quantity": 1 }]
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let recipe_id = detail["id"].as_i64().unwrap();

        let (status, row) = send(
            app.clone(),
            json_request(
                "POST",
                "/api/ingredient-prices",
                &serde_json::json!({
                    "ingredient_name": "Milk",
                    "store": "Whole Foods",
                    "zip_code": "47906",
                    "price": 4.0,
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(row["store"], "wholefoods");

        let (status, pricing) = send(
            app,
            get(&format!("/api/recipe-pricing?recipeId={recipe_id}&stores=wholefoods")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pricing["cheapest"]["store"], "wholefoods");
        assert_eq!(pricing["pricedIngredients"], 1);
    }

    #[tokio::test]
    async fn internal_errors_carry_details_and_lookup_errors_do_not() {
        let response = ApiError::Internal(anyhow::anyhow!("disk full")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
        assert_eq!(json["details"], "disk full");

        let response = ApiError::Lookup(anyhow::anyhow!("no such table")).into_response();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Failed to look up prices");
        assert!(json.get("details").is_none());

        let response = ApiError::NotFound("Recipe not found".to_string()).into_response();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json.get("details").is_none());
    }

    #[test]
    fn key_hint_handles_short_and_multibyte_keys() {
        assert_eq!(key_hint("abcdef0123456789"), "abcd...6789");
        assert_eq!(key_hint("abc"), "***");
        assert_eq!(key_hint(""), "");
        assert_eq!(key_hint("ключключключ"), "ключ...ключ");
    }
}
