//! System prompt assembly.
//!
//! Two prompts drive the model. The main prompt sets the persona, the
//! directive format, and the add-item flow, augmented per turn with any
//! pending-slot context so the model never re-asks for information the
//! session already holds. The result prompt constrains the second call —
//! the one that phrases a function result — to plain prose, never another
//! directive.

use crate::session::SessionState;
use serde_json::Value;

/// Base system prompt.
pub const SYSTEM_PROMPT: &str = r#"You are Sous, a friendly hands-free kitchen assistant.

Conversation style:
- Keep replies ULTRA short (one or two brief sentences)
- Be natural and direct, like a casual chat
- Never repeat information the user already gave
- Get straight to the point

RESPONSE FORMAT - VERY IMPORTANT:
When you need to run an action (search ingredients, add to the inventory, ...), always answer with this exact JSON shape:

{
  "action": "functionName",
  "params": {parameters},
  "needs_info": "missing_field or null",
  "user_message": "message to the user"
}

When you only need to talk, answer in plain text.

AVAILABLE FUNCTIONS:
1. searchIngredients(query: string) - search the ingredient catalog by name
2. addToInventory(ingredientId: string, quantity: number, unit: string, location: string) - add to the inventory
3. getInventory(location?: string) - fetch the inventory
4. searchRecipes(query: string) - search recipes

FLOW FOR ADDING INGREDIENTS (CRITICAL - FOLLOW EXACTLY):

User: "add three tomatoes"
Step 1 - ALWAYS search for the ingredient first:
{
  "action": "searchIngredients",
  "params": {"query": "tomato"},
  "needs_info": null,
  "user_message": "Searching for tomato..."
}

The system stores the found ingredient and asks for a location automatically when one is missing.

User: "in the pantry"
The system adds the item automatically using the ingredient id it found.

IMPORTANT:
- ONLY call searchIngredients with the ingredient name
- NEVER call addToInventory yourself
- NEVER invent ingredient ids
- The system completes the add once it has ingredient + location

LOCATION MAPPING (what the user says -> database name):
- "fridge", "refrigerator", "icebox" -> "Refrigerator"
- "freezer", "deep freeze" -> "Freezer"
- "pantry", "cupboard", "larder" -> "Pantry"

RULES:
- If the user says a quantity ("three tomatoes"), use it with unit "pieces"
- If no quantity is given, use 1
- Do not ask for expiration dates
- Keep confirmations short: "Done", "Added", "Ok"
- NEVER invent data; always use the functions"#;

/// Build the per-turn system prompt: the base prompt plus pending-slot
/// context, mirroring what the session already knows.
#[must_use]
pub fn build_system_prompt(session: &SessionState) -> String {
    let mut prompt = SYSTEM_PROMPT.to_owned();

    if let Some(item) = &session.pending_item {
        prompt.push_str(&format!(
            "\n\nPending ingredient: {} (id {})\nQuantity: {}\nUnit: {}",
            item.name, item.id, session.pending_quantity, session.pending_unit
        ));
    }
    if let Some(location) = session.pending_location {
        prompt.push_str(&format!(
            "\nLocation already given: {}\nDo NOT ask for the location, we already have it.",
            location.canonical_name()
        ));
    }

    prompt
}

/// Build the strict prompt for the second model call that phrases a
/// function result as a spoken answer.
#[must_use]
pub fn build_result_prompt(summary: &str) -> String {
    format!(
        r#"You are Sous, a friendly kitchen assistant.

FUNCTION RESULT:
{summary}

IMPORTANT INSTRUCTIONS:
1. Answer ONLY with natural plain text, NEVER with JSON
2. Speak in second person (you/you have), NOT first person (I/I have)
3. Be concise: two short sentences at most
4. Base your answer ONLY on the result shown above
5. Do NOT invent information that is not in the result

CORRECT example: "You have 3 tomatoes in the pantry"
INCORRECT example: {{"action": "...", "user_message": "..."}}
INCORRECT example: "I have 3 tomatoes in the pantry"

Now answer the user's question based on the result:"#
    )
}

/// Format a function result for the model. Inventory listings get a
/// readable per-item breakdown; everything else is passed as compact JSON.
#[must_use]
pub fn summarize_result(function_name: &str, data: &Value) -> String {
    if function_name == "getInventory" {
        let items = data
            .get("items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .or_else(|| data.as_array().map(Vec::as_slice))
            .unwrap_or_default();
        if items.is_empty() {
            return "No ingredients in the inventory matched those criteria.".to_owned();
        }
        let mut summary = format!("Found {} ingredient(s) in the inventory:\n", items.len());
        for item in items {
            let name = item.get("name").and_then(Value::as_str).unwrap_or("unknown");
            let quantity = item.get("quantity").and_then(Value::as_u64).unwrap_or(0);
            let unit = item.get("unit").and_then(Value::as_str).unwrap_or("");
            let location = item.get("location").and_then(Value::as_str).unwrap_or("");
            summary.push_str(&format!("- {quantity} {unit} of {name} in {location}\n"));
        }
        summary
    } else {
        format!("Result of {function_name}: {data}")
    }
}
