//! Customer orders: request validation, total computation and the committed
//! order record.

use core::str::FromStr;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use asrs_core::{CompartmentId, DomainError, DomainResult, Entity, ItemId, Money, OrderId};

use crate::topology::Location;

/// Order status lifecycle. The allocation engine only ever creates `Pending`
/// orders; later transitions belong to fulfilment downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown order status '{other}'"
            ))),
        }
    }
}

/// Customer contact fields captured with the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl Customer {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: None,
            address: None,
        }
    }

    fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("customer name cannot be empty"));
        }
        match self.email.trim().split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
            _ => Err(DomainError::validation(format!(
                "customer email '{}' is malformed",
                self.email
            ))),
        }
    }
}

/// One requested line: item, quantity, unit price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub item_id: ItemId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderLineRequest {
    pub fn new(item_id: ItemId, quantity: u32, unit_price: Money) -> Self {
        Self {
            item_id,
            quantity,
            unit_price,
        }
    }
}

/// Largest quantity a single line may request.
pub const MAX_LINE_QUANTITY: u32 = i32::MAX as u32;

/// Largest amount, in cents, for a unit price or an order total.
pub const MAX_AMOUNT_CENTS: u64 = i64::MAX as u64;

/// Inbound order request, as handed over by the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub customer: Customer,
    pub lines: Vec<OrderLineRequest>,
    /// Total the caller believes the order comes to. Only checked, never trusted.
    #[serde(default)]
    pub declared_total: Option<Money>,
}

impl PlaceOrder {
    pub fn new(customer: Customer, lines: Vec<OrderLineRequest>) -> Self {
        Self {
            customer,
            lines,
            declared_total: None,
        }
    }

    pub fn with_declared_total(mut self, total: Money) -> Self {
        self.declared_total = Some(total);
        self
    }

    /// Check the request shape and compute the total server-side.
    ///
    /// Quantities and amounts are bounded by what the ledger can persist
    /// (`INTEGER` quantities, `BIGINT` cents).
    pub fn validate(self) -> DomainResult<ValidatedOrder> {
        self.customer.validate()?;

        if self.lines.is_empty() {
            return Err(DomainError::validation("order must have at least one line"));
        }

        let mut total = Money::ZERO;
        for (idx, line) in self.lines.iter().enumerate() {
            let line_no = idx + 1;
            if line.quantity == 0 {
                return Err(DomainError::validation(format!(
                    "line {line_no}: quantity must be positive"
                )));
            }
            if line.quantity > MAX_LINE_QUANTITY {
                return Err(DomainError::validation(format!(
                    "line {line_no}: quantity exceeds {MAX_LINE_QUANTITY}"
                )));
            }
            if line.unit_price.is_zero() {
                return Err(DomainError::validation(format!(
                    "line {line_no}: unit_price must be positive"
                )));
            }
            if line.unit_price.cents() > MAX_AMOUNT_CENTS {
                return Err(DomainError::validation(format!(
                    "line {line_no}: unit_price exceeds the storable range"
                )));
            }
            total = line
                .unit_price
                .checked_mul(line.quantity)
                .and_then(|line_total| total.checked_add(line_total))
                .filter(|sum| sum.cents() <= MAX_AMOUNT_CENTS)
                .ok_or_else(|| DomainError::validation("order total overflows"))?;
        }

        if let Some(declared) = self.declared_total {
            if declared != total {
                return Err(DomainError::validation(format!(
                    "declared total {declared} does not match line total {total}"
                )));
            }
        }

        Ok(ValidatedOrder {
            customer: self.customer,
            lines: self.lines,
            total,
        })
    }
}

/// A request that passed validation. Only constructible through `PlaceOrder::validate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOrder {
    customer: Customer,
    lines: Vec<OrderLineRequest>,
    total: Money,
}

impl ValidatedOrder {
    pub fn customer(&self) -> &Customer {
        &self.customer
    }

    pub fn lines(&self) -> &[OrderLineRequest] {
        &self.lines
    }

    pub fn total(&self) -> Money {
        self.total
    }

    /// Materialize the `Pending` order record with numbered lines.
    pub fn to_order(&self, id: OrderId, now: DateTime<Utc>) -> Order {
        let lines = self
            .lines
            .iter()
            .enumerate()
            .map(|(idx, line)| OrderLine {
                order_id: id,
                line_no: idx as u32 + 1,
                item_id: line.item_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect();

        Order {
            id,
            customer: self.customer.clone(),
            total_amount: self.total,
            status: OrderStatus::Pending,
            lines,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub order_id: OrderId,
    pub line_no: u32,
    pub item_id: ItemId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderLine {
    /// `quantity × unit_price`. Cannot overflow for a line that passed validation.
    pub fn line_total(&self) -> Money {
        self.unit_price
            .checked_mul(self.quantity)
            .unwrap_or(Money::from_cents(u64::MAX))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer: Customer,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A compartment emptied to satisfy an order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasedCompartment {
    pub line_no: u32,
    pub item_id: ItemId,
    pub compartment_id: CompartmentId,
    pub location: Location,
}

/// Human-readable line-item summary, one line per order line:
/// `2 x Gear @ 10.00 = 20.00 [D4c, D5c]`.
pub fn summarize(
    order: &Order,
    item_names: &BTreeMap<ItemId, String>,
    releases: &[ReleasedCompartment],
) -> String {
    order
        .lines
        .iter()
        .map(|line| {
            let name = item_names
                .get(&line.item_id)
                .cloned()
                .unwrap_or_else(|| format!("item {}", line.item_id));
            let locations: Vec<String> = releases
                .iter()
                .filter(|r| r.line_no == line.line_no)
                .map(|r| r.location.to_string())
                .collect();
            format!(
                "{} x {} @ {} = {} [{}]",
                line.quantity,
                name,
                line.unit_price,
                line.line_total(),
                locations.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn customer() -> Customer {
        Customer::new("Ada", "ada@example.com")
    }

    fn line(item: i64, quantity: u32, cents: u64) -> OrderLineRequest {
        OrderLineRequest::new(ItemId::new(item), quantity, Money::from_cents(cents))
    }

    #[test]
    fn total_is_sum_of_quantity_times_price() {
        let validated = PlaceOrder::new(customer(), vec![line(1, 2, 1000), line(2, 1, 500)])
            .validate()
            .unwrap();
        assert_eq!(validated.total(), Money::from_cents(2500));
        assert_eq!(validated.total().to_string(), "25.00");
    }

    #[test]
    fn matching_declared_total_is_accepted() {
        let validated = PlaceOrder::new(customer(), vec![line(1, 2, 1000)])
            .with_declared_total(Money::from_cents(2000))
            .validate()
            .unwrap();
        assert_eq!(validated.total(), Money::from_cents(2000));
    }

    #[test]
    fn mismatching_declared_total_is_rejected() {
        let err = PlaceOrder::new(customer(), vec![line(1, 2, 1000), line(2, 1, 500)])
            .with_declared_total(Money::from_cents(100))
            .validate()
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("does not match")));
    }

    #[test]
    fn zero_quantity_and_zero_price_are_rejected() {
        let err = PlaceOrder::new(customer(), vec![line(1, 1, 100), line(2, 0, 100)])
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("line 2: quantity must be positive")
        );

        let err = PlaceOrder::new(customer(), vec![line(1, 1, 0)])
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("line 1: unit_price must be positive")
        );
    }

    #[test]
    fn empty_orders_and_bad_customers_are_rejected() {
        assert!(PlaceOrder::new(customer(), vec![]).validate().is_err());
        assert!(
            PlaceOrder::new(Customer::new("", "a@b.c"), vec![line(1, 1, 1)])
                .validate()
                .is_err()
        );
        for email in ["", "nobody", "@example.com", "ada@"] {
            assert!(
                PlaceOrder::new(Customer::new("Ada", email), vec![line(1, 1, 1)])
                    .validate()
                    .is_err(),
                "accepted {email:?}"
            );
        }
    }

    #[test]
    fn overflowing_totals_are_rejected() {
        let err = PlaceOrder::new(customer(), vec![line(1, 2, MAX_AMOUNT_CENTS)])
            .validate()
            .unwrap_err();
        assert_eq!(err, DomainError::validation("order total overflows"));

        let err = PlaceOrder::new(
            customer(),
            vec![line(1, 1, MAX_AMOUNT_CENTS), line(2, 1, 1)],
        )
        .validate()
        .unwrap_err();
        assert_eq!(err, DomainError::validation("order total overflows"));
    }

    #[test]
    fn values_beyond_the_ledger_columns_are_rejected() {
        let err = PlaceOrder::new(customer(), vec![line(1, MAX_LINE_QUANTITY + 1, 1)])
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::validation(format!("line 1: quantity exceeds {MAX_LINE_QUANTITY}"))
        );

        let err = PlaceOrder::new(customer(), vec![line(1, 1, MAX_AMOUNT_CENTS + 1)])
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("line 1: unit_price exceeds the storable range")
        );

        let at_limit = PlaceOrder::new(customer(), vec![line(1, MAX_LINE_QUANTITY, 1)])
            .validate()
            .unwrap();
        assert_eq!(at_limit.total(), Money::from_cents(MAX_LINE_QUANTITY as u64));
    }

    #[test]
    fn materialized_order_is_pending_with_numbered_lines() {
        let id = OrderId::new();
        let now = Utc::now();
        let order = PlaceOrder::new(customer(), vec![line(1, 2, 1000), line(2, 1, 500)])
            .validate()
            .unwrap()
            .to_order(id, now);

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, Money::from_cents(2500));
        assert_eq!(order.lines.len(), 2);
        assert_eq!(order.lines[1].line_no, 2);
        assert_eq!(order.lines[0].line_total(), Money::from_cents(2000));
        assert!(order.lines.iter().all(|l| l.order_id == id));
    }

    #[test]
    fn summary_lists_quantity_name_price_and_locations() {
        let order = PlaceOrder::new(customer(), vec![line(1, 2, 1000)])
            .validate()
            .unwrap()
            .to_order(OrderId::new(), Utc::now());
        let names = BTreeMap::from([(ItemId::new(1), "Gear".to_string())]);
        let releases = vec![
            ReleasedCompartment {
                line_no: 1,
                item_id: ItemId::new(1),
                compartment_id: CompartmentId::new(12),
                location: "D4c".parse().unwrap(),
            },
            ReleasedCompartment {
                line_no: 1,
                item_id: ItemId::new(1),
                compartment_id: CompartmentId::new(15),
                location: "D5c".parse().unwrap(),
            },
        ];

        assert_eq!(
            summarize(&order, &names, &releases),
            "2 x Gear @ 10.00 = 20.00 [D4c, D5c]"
        );
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Shipped".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        assert!("lost".parse::<OrderStatus>().is_err());
    }

    proptest! {
        #[test]
        fn validated_total_equals_sum_of_line_totals(
            lines in proptest::collection::vec((1i64..50, 1u32..100, 1u64..100_000), 1..10)
        ) {
            let requests: Vec<_> = lines.iter().map(|(i, q, p)| line(*i, *q, *p)).collect();
            let expected: u64 = lines.iter().map(|(_, q, p)| u64::from(*q) * p).sum();

            let order = PlaceOrder::new(customer(), requests)
                .validate()
                .unwrap()
                .to_order(OrderId::new(), Utc::now());

            prop_assert_eq!(order.total_amount.cents(), expected);
            let summed = order
                .lines
                .iter()
                .fold(0u64, |acc, l| acc + l.line_total().cents());
            prop_assert_eq!(summed, expected);
        }
    }
}
