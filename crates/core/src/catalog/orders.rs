use super::{BackendFunction, require_non_blank};
use crate::backend::BackendRequest;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Client identifiers are numeric in the backend but the model hears them as
/// digits, so send a number whenever the text is one.
fn client_id_value(client_id: &str) -> Value {
    let trimmed = client_id.trim();
    match trimmed.parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::from(trimmed),
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[allow(non_snake_case)]
pub struct ClientIdArgs {
    /// The client identifier the caller provided, digits only.
    pub clientId: String,
}

pub struct CheckClientId;

impl BackendFunction for CheckClientId {
    type Args = ClientIdArgs;
    const NAME: &'static str = "checkClientId";
    const DESCRIPTION: &'static str =
        "Verify that a client exists. Call this before taking any order.";

    fn check(args: &Self::Args) -> Result<(), String> {
        require_non_blank("clientId", &args.clientId)
    }

    fn request(args: Self::Args) -> BackendRequest {
        BackendRequest::get(["users", "search", args.clientId.trim()])
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SearchProductsArgs {
    /// Free-text product name or description.
    pub query: String,
}

pub struct SearchProducts;

impl BackendFunction for SearchProducts {
    type Args = SearchProductsArgs;
    const NAME: &'static str = "searchProducts";
    const DESCRIPTION: &'static str =
        "Search the product catalog by name or description and return matching products.";

    fn check(args: &Self::Args) -> Result<(), String> {
        require_non_blank("query", &args.query)
    }

    fn request(args: Self::Args) -> BackendRequest {
        BackendRequest::post(
            ["products", "search"],
            json!({ "query": args.query.trim() }),
        )
    }
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[allow(non_snake_case)]
pub struct ProductLine {
    /// Product identifier as returned by searchProducts.
    pub productId: String,
    /// Number of units.
    pub quantity: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[allow(non_snake_case)]
pub struct CreateOrderArgs {
    /// Verified client identifier.
    pub clientId: String,
    /// Products and quantities to order.
    pub products: Vec<ProductLine>,
}

pub struct CreateOrder;

impl BackendFunction for CreateOrder {
    type Args = CreateOrderArgs;
    const NAME: &'static str = "createOrder";
    const DESCRIPTION: &'static str =
        "Create an order with one or more products for a verified client.";
    const MUTATING: bool = true;

    fn check(args: &Self::Args) -> Result<(), String> {
        require_non_blank("clientId", &args.clientId)?;
        if args.products.is_empty() {
            return Err("`products` must contain at least one product".to_string());
        }
        for line in &args.products {
            require_non_blank("productId", &line.productId)?;
            if line.quantity == 0 {
                return Err(format!("quantity for product {} must be positive", line.productId));
            }
        }
        Ok(())
    }

    fn request(args: Self::Args) -> BackendRequest {
        BackendRequest::post(
            ["orders"],
            json!({
                "clientId": client_id_value(&args.clientId),
                "products": args.products,
            }),
        )
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[allow(non_snake_case)]
pub struct SingleProductOrderArgs {
    /// Verified client identifier.
    pub clientId: String,
    /// Product identifier as returned by searchProducts.
    pub productId: String,
    /// Number of units.
    pub quantity: u32,
}

pub struct CreateSingleProductOrder;

impl BackendFunction for CreateSingleProductOrder {
    type Args = SingleProductOrderArgs;
    const NAME: &'static str = "createSingleProductOrder";
    const DESCRIPTION: &'static str = "Create an order for a single product.";
    const MUTATING: bool = true;

    fn check(args: &Self::Args) -> Result<(), String> {
        require_non_blank("clientId", &args.clientId)?;
        require_non_blank("productId", &args.productId)?;
        if args.quantity == 0 {
            return Err("`quantity` must be positive".to_string());
        }
        Ok(())
    }

    fn request(args: Self::Args) -> BackendRequest {
        let line = ProductLine {
            productId: args.productId,
            quantity: args.quantity,
        };
        BackendRequest::post(
            ["orders"],
            json!({
                "clientId": client_id_value(&args.clientId),
                "products": [line],
            }),
        )
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[allow(non_snake_case)]
pub struct FinishOrderArgs {
    /// Order identifier returned when the order was created.
    pub orderId: String,
    /// Delivery date, YYYY-MM-DD.
    pub date: String,
    /// Delivery address.
    pub address: String,
}

pub struct FinishOrder;

impl BackendFunction for FinishOrder {
    type Args = FinishOrderArgs;
    const NAME: &'static str = "finishOrder";
    const DESCRIPTION: &'static str =
        "Confirm an order with its delivery date and address.";
    const MUTATING: bool = true;

    fn check(args: &Self::Args) -> Result<(), String> {
        require_non_blank("orderId", &args.orderId)?;
        require_non_blank("date", &args.date)?;
        require_non_blank("address", &args.address)
    }

    fn request(args: Self::Args) -> BackendRequest {
        BackendRequest::post(
            ["orders", args.orderId.trim(), "finish"],
            json!({ "date": args.date, "address": args.address }),
        )
    }
}

pub struct GetOrdersByClientId;

impl BackendFunction for GetOrdersByClientId {
    type Args = ClientIdArgs;
    const NAME: &'static str = "getOrdersByClientId";
    const DESCRIPTION: &'static str = "List the existing orders of a client.";

    fn check(args: &Self::Args) -> Result<(), String> {
        require_non_blank("clientId", &args.clientId)
    }

    fn request(args: Self::Args) -> BackendRequest {
        BackendRequest::get(["orders", "client", args.clientId.trim()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FunctionHandler;

    #[test]
    fn test_create_order_sends_numeric_client_id() {
        let request = FunctionHandler::of::<CreateOrder>()
            .prepare(json!({
                "clientId": "1042",
                "products": [{ "productId": "P-7", "quantity": 2 }]
            }))
            .unwrap();
        assert_eq!(request.path(), "/orders");
        assert_eq!(
            request.body.unwrap(),
            json!({
                "clientId": 1042,
                "products": [{ "productId": "P-7", "quantity": 2 }]
            })
        );
    }

    #[test]
    fn test_non_numeric_client_id_stays_a_string() {
        assert_eq!(client_id_value(" C-9 "), json!("C-9"));
    }

    #[test]
    fn test_create_order_requires_products() {
        let err = FunctionHandler::of::<CreateOrder>()
            .prepare(json!({ "clientId": "1", "products": [] }))
            .unwrap_err();
        assert!(err.contains("products"));
    }

    #[test]
    fn test_single_product_order_wraps_line() {
        let request = FunctionHandler::of::<CreateSingleProductOrder>()
            .prepare(json!({ "clientId": "7", "productId": "P-1", "quantity": 3 }))
            .unwrap();
        assert_eq!(
            request.body.unwrap()["products"],
            json!([{ "productId": "P-1", "quantity": 3 }])
        );
    }

    #[test]
    fn test_finish_order_targets_order_path() {
        let request = FunctionHandler::of::<FinishOrder>()
            .prepare(json!({ "orderId": "55", "date": "2026-10-20", "address": "Main St 1" }))
            .unwrap();
        assert_eq!(request.path(), "/orders/55/finish");
    }

    #[test]
    fn test_blank_client_id_is_rejected() {
        let err = FunctionHandler::of::<CheckClientId>()
            .prepare(json!({ "clientId": "  " }))
            .unwrap_err();
        assert!(err.contains("clientId"));
    }

    #[test]
    fn test_orders_by_client_is_a_get() {
        let request = FunctionHandler::of::<GetOrdersByClientId>()
            .prepare(json!({ "clientId": "12" }))
            .unwrap();
        assert_eq!(request.method, crate::backend::HttpMethod::Get);
        assert_eq!(request.path(), "/orders/client/12");
    }
}
