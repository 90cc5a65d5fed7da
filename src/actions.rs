//! Validated remote function kinds.
//!
//! Directives arrive as open JSON maps; everything dispatched to the broker
//! goes through [`KitchenAction`] first, so unknown action names and missing
//! required arguments are rejected before they reach the wire.

use crate::directive::ActionDirective;
use crate::error::{AssistError, Result};
use crate::session::{CompositeAdd, DEFAULT_UNIT, StorageLocation, extract_location};
use serde_json::{Map, Value, json};

/// A remote function the executor knows how to run.
#[derive(Debug, Clone, PartialEq)]
pub enum KitchenAction {
    /// Search the ingredient catalog by name or category.
    SearchIngredients {
        query: String,
        category: Option<String>,
    },
    /// Look up a specific ingredient in the user's inventory.
    SearchInventoryByName { ingredient_name: String },
    /// Fetch the inventory, optionally filtered by storage location.
    GetInventory { location: Option<StorageLocation> },
    /// Totals per location plus alerts.
    GetInventorySummary,
    /// Expired / expiring / low-stock alerts.
    GetInventoryAlerts,
    /// Search recipes by name or description.
    SearchRecipes { query: String },
    /// Recipes that can be made from the given ingredients.
    GetRecipesByIngredients {
        ingredient_ids: Vec<String>,
        max_missing: Option<u32>,
    },
    /// Full recipe details including steps.
    GetRecipeDetails { recipe_id: String },
    /// Check whether the user has a recipe's ingredients.
    CheckRecipeIngredients { recipe_id: String },
    /// Add an ingredient to the inventory. The id must come from a catalog
    /// search, never from the model.
    AddToInventory {
        ingredient_id: String,
        quantity: u32,
        unit: String,
        location: StorageLocation,
    },
}

impl KitchenAction {
    /// Validate an open directive into a typed action.
    ///
    /// # Errors
    ///
    /// Returns [`AssistError::Decode`] on an unknown action name, a missing
    /// required argument, or an unrecognizable storage location.
    pub fn from_directive(directive: &ActionDirective) -> Result<Self> {
        let params = &directive.params;
        match directive.action.as_str() {
            "searchIngredients" => Ok(Self::SearchIngredients {
                query: required_str(params, "query")?,
                category: optional_str(params, "category"),
            }),
            "searchInventoryByName" => Ok(Self::SearchInventoryByName {
                ingredient_name: required_str(params, "ingredientName")?,
            }),
            "getInventory" => {
                let location = match optional_str(params, "location") {
                    Some(raw) => Some(parse_location(&raw)?),
                    None => None,
                };
                Ok(Self::GetInventory { location })
            }
            "getInventorySummary" => Ok(Self::GetInventorySummary),
            "getInventoryAlerts" => Ok(Self::GetInventoryAlerts),
            "searchRecipes" => Ok(Self::SearchRecipes {
                query: required_str(params, "query")?,
            }),
            "getRecipesByIngredients" => Ok(Self::GetRecipesByIngredients {
                ingredient_ids: required_str_array(params, "ingredientIds")?,
                max_missing: params
                    .get("maxMissingIngredients")
                    .and_then(Value::as_u64)
                    .map(|n| n as u32),
            }),
            "getRecipeDetails" => Ok(Self::GetRecipeDetails {
                recipe_id: required_str(params, "recipeId")?,
            }),
            "checkRecipeIngredients" => Ok(Self::CheckRecipeIngredients {
                recipe_id: required_str(params, "recipeId")?,
            }),
            "addToInventory" => Ok(Self::AddToInventory {
                ingredient_id: required_str(params, "ingredientId")?,
                quantity: params
                    .get("quantity")
                    .and_then(Value::as_u64)
                    .map_or(1, |n| n as u32),
                unit: optional_str(params, "unit").unwrap_or_else(|| DEFAULT_UNIT.to_owned()),
                location: parse_location(&required_str(params, "location")?)?,
            }),
            other => Err(AssistError::Decode(format!("unknown action '{other}'"))),
        }
    }

    /// Wire name of the remote function.
    #[must_use]
    pub fn function_name(&self) -> &'static str {
        match self {
            Self::SearchIngredients { .. } => "searchIngredients",
            Self::SearchInventoryByName { .. } => "searchInventoryByName",
            Self::GetInventory { .. } => "getInventory",
            Self::GetInventorySummary => "getInventorySummary",
            Self::GetInventoryAlerts => "getInventoryAlerts",
            Self::SearchRecipes { .. } => "searchRecipes",
            Self::GetRecipesByIngredients { .. } => "getRecipesByIngredients",
            Self::GetRecipeDetails { .. } => "getRecipeDetails",
            Self::CheckRecipeIngredients { .. } => "checkRecipeIngredients",
            Self::AddToInventory { .. } => "addToInventory",
        }
    }

    /// Wire argument object for the remote function.
    #[must_use]
    pub fn args(&self) -> Value {
        match self {
            Self::SearchIngredients { query, category } => {
                let mut args = json!({ "query": query });
                if let (Some(category), Some(map)) = (category, args.as_object_mut()) {
                    map.insert("category".to_owned(), json!(category));
                }
                args
            }
            Self::SearchInventoryByName { ingredient_name } => {
                json!({ "ingredientName": ingredient_name })
            }
            Self::GetInventory { location } => match location {
                Some(location) => json!({ "location": location.canonical_name() }),
                None => json!({}),
            },
            Self::GetInventorySummary | Self::GetInventoryAlerts => json!({}),
            Self::SearchRecipes { query } => json!({ "query": query }),
            Self::GetRecipesByIngredients {
                ingredient_ids,
                max_missing,
            } => {
                let mut args = json!({ "ingredientIds": ingredient_ids });
                if let (Some(max), Some(map)) = (max_missing, args.as_object_mut()) {
                    map.insert("maxMissingIngredients".to_owned(), json!(max));
                }
                args
            }
            Self::GetRecipeDetails { recipe_id } | Self::CheckRecipeIngredients { recipe_id } => {
                json!({ "recipeId": recipe_id })
            }
            Self::AddToInventory {
                ingredient_id,
                quantity,
                unit,
                location,
            } => json!({
                "ingredientId": ingredient_id,
                "quantity": quantity,
                "unit": unit,
                "location": location.canonical_name(),
            }),
        }
    }
}

impl From<CompositeAdd> for KitchenAction {
    fn from(composite: CompositeAdd) -> Self {
        Self::AddToInventory {
            ingredient_id: composite.ingredient_id,
            quantity: composite.quantity,
            unit: composite.unit,
            location: composite.location,
        }
    }
}

fn required_str(params: &Map<String, Value>, key: &str) -> Result<String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| AssistError::Decode(format!("missing required argument '{key}'")))
}

fn optional_str(params: &Map<String, Value>, key: &str) -> Option<String> {
    params.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn required_str_array(params: &Map<String, Value>, key: &str) -> Result<Vec<String>> {
    let values = params
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| AssistError::Decode(format!("missing required argument '{key}'")))?;
    Ok(values
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_owned)
        .collect())
}

/// Accept any spoken synonym for a location, not just the canonical name.
fn parse_location(raw: &str) -> Result<StorageLocation> {
    extract_location(raw)
        .ok_or_else(|| AssistError::Decode(format!("unrecognized storage location '{raw}'")))
}
