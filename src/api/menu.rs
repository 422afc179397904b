use aide::axum::routing::{get_with, put_with};
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::http::StatusCode;
use axum::Json;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::broadcast::Topic;
use crate::database::AppState;
use crate::error::{ServiceError, ServiceResult};
use crate::extract::{JsonBody, Path};
use crate::models;
use crate::request_state::RequestState;
use crate::validation::{Validator, MAX_NAME_LEN, MAX_NOTE_LEN, MAX_URL_LEN};

use super::log_activity;

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route("/menu", get_with(get_menu, get_menu_docs))
        .api_route(
            "/menu/category/:id",
            get_with(get_category, get_category_docs)
                .put_with(update_category, update_category_docs)
                .delete_with(delete_category, delete_category_docs),
        )
        .api_route(
            "/menu/categories",
            get_with(list_categories, list_categories_docs)
                .post_with(create_category, create_category_docs),
        )
        .api_route(
            "/menu/item/:id",
            get_with(get_menu_item, get_menu_item_docs)
                .put_with(update_menu_item, update_menu_item_docs)
                .delete_with(delete_menu_item, delete_menu_item_docs),
        )
        .api_route(
            "/menu/item/:id/availability",
            put_with(set_menu_item_availability, set_menu_item_availability_docs),
        )
        .api_route(
            "/menu/items",
            get_with(list_menu_items, list_menu_items_docs)
                .post_with(create_menu_item, create_menu_item_docs),
        )
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct CategoryDto {
    pub id: u64,
    pub name: String,
    pub position: i32,
}

impl From<&models::MenuCategory> for CategoryDto {
    fn from(value: &models::MenuCategory) -> Self {
        Self {
            id: value.id,
            name: value.name.to_owned(),
            position: value.position,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct MenuItemDto {
    pub id: u64,
    pub category_id: Option<u64>,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub image_url: Option<String>,
    pub available: bool,
}

impl From<&models::MenuItem> for MenuItemDto {
    fn from(value: &models::MenuItem) -> Self {
        Self {
            id: value.id,
            category_id: value.category_id,
            name: value.name.to_owned(),
            description: value.description.to_owned(),
            price_cents: value.price_cents,
            image_url: value.image_url.to_owned(),
            available: value.available,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct MenuSectionDto {
    /// `None` collects the items without a category.
    pub category: Option<CategoryDto>,
    pub items: Vec<MenuItemDto>,
}

/// Groups items under their categories, ordered like `categories`.
/// Items without a known category end up in a trailing section.
pub fn build_menu(
    categories: &[models::MenuCategory],
    items: &[models::MenuItem],
) -> Vec<MenuSectionDto> {
    let mut sections: Vec<MenuSectionDto> = categories
        .iter()
        .map(|category| MenuSectionDto {
            category: Some(CategoryDto::from(category)),
            items: items
                .iter()
                .filter(|i| i.category_id == Some(category.id))
                .map(MenuItemDto::from)
                .collect(),
        })
        .collect();

    let uncategorized: Vec<MenuItemDto> = items
        .iter()
        .filter(|i| {
            i.category_id
                .map_or(true, |id| !categories.iter().any(|c| c.id == id))
        })
        .map(MenuItemDto::from)
        .collect();
    if !uncategorized.is_empty() {
        sections.push(MenuSectionDto {
            category: None,
            items: uncategorized,
        });
    }

    sections
}

async fn get_menu(mut state: RequestState) -> ServiceResult<Json<Vec<MenuSectionDto>>> {
    let categories = state.db.get_all_categories().await?;
    let items = state.db.get_all_menu_items().await?;
    Ok(Json(build_menu(&categories, &items)))
}

fn get_menu_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get the menu: categories ordered by position, each with its items.")
        .tag("menu")
        .response::<200, Json<Vec<MenuSectionDto>>>()
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct SaveCategoryDto {
    pub name: String,
    #[serde(default)]
    pub position: i32,
}

async fn list_categories(mut state: RequestState) -> ServiceResult<Json<Vec<CategoryDto>>> {
    let categories = state.db.get_all_categories().await?;
    Ok(Json(categories.iter().map(CategoryDto::from).collect()))
}

fn list_categories_docs(op: TransformOperation) -> TransformOperation {
    op.description("List all menu categories.")
        .tag("menu")
        .response::<200, Json<Vec<CategoryDto>>>()
}

async fn get_category(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<Json<CategoryDto>> {
    let category = state.db.get_category_by_id(id).await?;

    if let Some(category) = category {
        return Ok(Json(CategoryDto::from(&category)));
    }

    Err(ServiceError::NotFound)
}

fn get_category_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get a menu category by id.")
        .tag("menu")
        .response::<200, Json<CategoryDto>>()
        .response_with::<404, (), _>(|res| res.description("The requested category does not exist!"))
}

async fn create_category(
    mut state: RequestState,
    form: JsonBody<SaveCategoryDto>,
) -> ServiceResult<Json<CategoryDto>> {
    let user = state.session_require_manager()?;
    let form = form.0;

    Validator::new()
        .required_text("name", &form.name, MAX_NAME_LEN)
        .finish()?;

    let name = form.name.trim().to_owned();
    if state.db.category_name_exists(&name, 0).await? {
        return Err(ServiceError::BadRequest("category_name_taken"));
    }

    let category = models::MenuCategory {
        id: 0,
        name,
        position: form.position,
    };

    let category = state.db.store_category(category).await?;
    let dto = CategoryDto::from(&category);

    log_activity(&mut state.db, Some(user.id), "create", "menu_category", Some(category.id), &category.name).await;
    state.events.emit(Topic::Menu, "category.created", None, &dto);
    Ok(Json(dto))
}

fn create_category_docs(op: TransformOperation) -> TransformOperation {
    op.description("Create a new menu category.")
        .tag("menu")
        .response::<200, Json<CategoryDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input or name taken!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn update_category(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<SaveCategoryDto>,
) -> ServiceResult<Json<CategoryDto>> {
    let user = state.session_require_manager()?;
    let form = form.0;

    Validator::new()
        .required_text("name", &form.name, MAX_NAME_LEN)
        .finish()?;

    let category = state.db.get_category_by_id(id).await?;

    if let Some(mut category) = category {
        let name = form.name.trim().to_owned();
        if state.db.category_name_exists(&name, id).await? {
            return Err(ServiceError::BadRequest("category_name_taken"));
        }

        category.name = name;
        category.position = form.position;

        let category = state.db.store_category(category).await?;
        let dto = CategoryDto::from(&category);

        log_activity(&mut state.db, Some(user.id), "update", "menu_category", Some(id), &category.name).await;
        state.events.emit(Topic::Menu, "category.updated", None, &dto);
        return Ok(Json(dto));
    }

    Err(ServiceError::NotFound)
}

fn update_category_docs(op: TransformOperation) -> TransformOperation {
    op.description("Update an existing menu category.")
        .tag("menu")
        .response::<200, Json<CategoryDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input or name taken!"))
        .response_with::<404, (), _>(|res| res.description("The requested category does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn delete_category(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<StatusCode> {
    let user = state.session_require_manager()?;

    if state.db.get_category_by_id(id).await?.is_none() {
        return Err(ServiceError::NotFound);
    }

    state.db.delete_category(id).await?;

    log_activity(&mut state.db, Some(user.id), "delete", "menu_category", Some(id), "").await;
    state
        .events
        .emit(Topic::Menu, "category.deleted", None, &serde_json::json!({ "id": id }));
    Ok(StatusCode::NO_CONTENT)
}

fn delete_category_docs(op: TransformOperation) -> TransformOperation {
    op.description("Delete a menu category. Its items stay on the menu without category.")
        .tag("menu")
        .response_with::<204, (), _>(|res| res.description("The category was successfully deleted!"))
        .response_with::<404, (), _>(|res| res.description("The requested category does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct SaveMenuItemDto {
    pub category_id: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: i64,
    pub image_url: Option<String>,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

impl SaveMenuItemDto {
    fn validate(&self) -> ServiceResult<()> {
        Validator::new()
            .required_text("name", &self.name, MAX_NAME_LEN)
            .optional_text("description", Some(&self.description), MAX_NOTE_LEN)
            .optional_text("image_url", self.image_url.as_deref(), MAX_URL_LEN)
            .range("price_cents", self.price_cents, 0, i64::MAX)
            .finish()
    }
}

async fn list_menu_items(mut state: RequestState) -> ServiceResult<Json<Vec<MenuItemDto>>> {
    let items = state.db.get_all_menu_items().await?;
    Ok(Json(items.iter().map(MenuItemDto::from).collect()))
}

fn list_menu_items_docs(op: TransformOperation) -> TransformOperation {
    op.description("List all menu items.")
        .tag("menu")
        .response::<200, Json<Vec<MenuItemDto>>>()
}

async fn get_menu_item(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<Json<MenuItemDto>> {
    let item = state.db.get_menu_item_by_id(id).await?;

    if let Some(item) = item {
        return Ok(Json(MenuItemDto::from(&item)));
    }

    Err(ServiceError::NotFound)
}

fn get_menu_item_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get a menu item by id.")
        .tag("menu")
        .response::<200, Json<MenuItemDto>>()
        .response_with::<404, (), _>(|res| res.description("The requested menu item does not exist!"))
}

async fn create_menu_item(
    mut state: RequestState,
    form: JsonBody<SaveMenuItemDto>,
) -> ServiceResult<Json<MenuItemDto>> {
    let user = state.session_require_manager()?;
    let form = form.0;
    form.validate()?;

    let item = models::MenuItem {
        id: 0,
        category_id: form.category_id,
        name: form.name.trim().to_owned(),
        description: form.description.trim().to_owned(),
        price_cents: form.price_cents,
        image_url: form.image_url.filter(|u| !u.trim().is_empty()),
        available: form.available,
    };

    let item = state.db.store_menu_item(item).await?;
    let dto = MenuItemDto::from(&item);

    log_activity(&mut state.db, Some(user.id), "create", "menu_item", Some(item.id), &item.name).await;
    state.events.emit(Topic::Menu, "item.created", None, &dto);
    Ok(Json(dto))
}

fn create_menu_item_docs(op: TransformOperation) -> TransformOperation {
    op.description("Create a new menu item.")
        .tag("menu")
        .response::<200, Json<MenuItemDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input or unknown category!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn update_menu_item(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<SaveMenuItemDto>,
) -> ServiceResult<Json<MenuItemDto>> {
    let user = state.session_require_manager()?;
    let form = form.0;
    form.validate()?;

    let item = state.db.get_menu_item_by_id(id).await?;

    if let Some(mut item) = item {
        item.category_id = form.category_id;
        item.name = form.name.trim().to_owned();
        item.description = form.description.trim().to_owned();
        item.price_cents = form.price_cents;
        item.image_url = form.image_url.filter(|u| !u.trim().is_empty());
        item.available = form.available;

        let item = state.db.store_menu_item(item).await?;
        let dto = MenuItemDto::from(&item);

        log_activity(&mut state.db, Some(user.id), "update", "menu_item", Some(id), &item.name).await;
        state.events.emit(Topic::Menu, "item.updated", None, &dto);
        return Ok(Json(dto));
    }

    Err(ServiceError::NotFound)
}

fn update_menu_item_docs(op: TransformOperation) -> TransformOperation {
    op.description("Update an existing menu item.")
        .tag("menu")
        .response::<200, Json<MenuItemDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input or unknown category!"))
        .response_with::<404, (), _>(|res| res.description("The requested menu item does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct AvailabilityDto {
    pub available: bool,
}

async fn set_menu_item_availability(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<AvailabilityDto>,
) -> ServiceResult<Json<MenuItemDto>> {
    let user = state.session_require_role(&[models::Role::Staff, models::Role::Kitchen])?;

    let item = state.db.set_menu_item_availability(id, form.0.available).await?;
    let dto = MenuItemDto::from(&item);

    let detail = if item.available { "available" } else { "sold out" };
    log_activity(&mut state.db, Some(user.id), "set_availability", "menu_item", Some(id), detail).await;
    state.events.emit(Topic::Menu, "item.availability", None, &dto);
    Ok(Json(dto))
}

fn set_menu_item_availability_docs(op: TransformOperation) -> TransformOperation {
    op.description("Mark a menu item as available or sold out.")
        .tag("menu")
        .response::<200, Json<MenuItemDto>>()
        .response_with::<404, (), _>(|res| res.description("The requested menu item does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["staff", "kitchen"])
}

async fn delete_menu_item(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<StatusCode> {
    let user = state.session_require_manager()?;

    if state.db.get_menu_item_by_id(id).await?.is_none() {
        return Err(ServiceError::NotFound);
    }

    state.db.delete_menu_item(id).await?;

    log_activity(&mut state.db, Some(user.id), "delete", "menu_item", Some(id), "").await;
    state
        .events
        .emit(Topic::Menu, "item.deleted", None, &serde_json::json!({ "id": id }));
    Ok(StatusCode::NO_CONTENT)
}

fn delete_menu_item_docs(op: TransformOperation) -> TransformOperation {
    op.description("Delete an existing menu item.")
        .tag("menu")
        .response_with::<204, (), _>(|res| res.description("The menu item was successfully deleted!"))
        .response_with::<404, (), _>(|res| res.description("The requested menu item does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: u64, category_id: Option<u64>) -> models::MenuItem {
        models::MenuItem {
            id,
            category_id,
            name: format!("Item {id}"),
            description: String::new(),
            price_cents: 100,
            image_url: None,
            available: true,
        }
    }

    #[test]
    fn menu_groups_items_by_category_order() {
        let categories = vec![
            models::MenuCategory { id: 2, name: "Starters".to_owned(), position: 0 },
            models::MenuCategory { id: 1, name: "Mains".to_owned(), position: 1 },
        ];
        let items = vec![item(10, Some(1)), item(11, Some(2)), item(12, None), item(13, Some(99))];

        let menu = build_menu(&categories, &items);

        assert_eq!(menu.len(), 3);
        assert_eq!(menu[0].category.as_ref().map(|c| c.id), Some(2));
        assert_eq!(menu[0].items.iter().map(|i| i.id).collect::<Vec<_>>(), vec![11]);
        assert_eq!(menu[1].items.iter().map(|i| i.id).collect::<Vec<_>>(), vec![10]);
        assert!(menu[2].category.is_none());
        assert_eq!(menu[2].items.iter().map(|i| i.id).collect::<Vec<_>>(), vec![12, 13]);
    }

    #[test]
    fn empty_uncategorized_section_is_omitted() {
        let categories = vec![models::MenuCategory { id: 1, name: "Mains".to_owned(), position: 0 }];
        let menu = build_menu(&categories, &[item(10, Some(1))]);
        assert_eq!(menu.len(), 1);
    }
}
