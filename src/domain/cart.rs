use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ServiceError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub tour_id: u64,
    pub name: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingCart {
    pub user_id: u64,
    pub items: Vec<OrderItem>,
    pub total: f64,
    pub updated_at: DateTime<Utc>,
}

/// A cart change applied atomically by the cart store.
#[derive(Debug, Clone, PartialEq)]
pub enum CartCommand {
    Add(OrderItem),
    Remove { tour_id: u64 },
}

impl ShoppingCart {
    pub fn empty(user_id: u64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            items: Vec::new(),
            total: 0.0,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, command: &CartCommand, now: DateTime<Utc>) -> Result<()> {
        match command {
            CartCommand::Add(item) => self.add(item.clone(), now),
            CartCommand::Remove { tour_id } => self.remove(*tour_id, now).map(|_| ()),
        }
    }

    pub fn contains(&self, tour_id: u64) -> bool {
        self.items.iter().any(|item| item.tour_id == tour_id)
    }

    pub fn add(&mut self, item: OrderItem, now: DateTime<Utc>) -> Result<()> {
        if self.contains(item.tour_id) {
            return Err(ServiceError::conflict(format!(
                "tour {} is already in the cart",
                item.tour_id
            )));
        }
        self.items.push(item);
        self.touch(now);
        Ok(())
    }

    pub fn remove(&mut self, tour_id: u64, now: DateTime<Utc>) -> Result<OrderItem> {
        let Some(index) = self.items.iter().position(|item| item.tour_id == tour_id) else {
            return Err(ServiceError::not_found(format!("cart item for tour {tour_id}")));
        };
        let removed = self.items.remove(index);
        self.touch(now);
        Ok(removed)
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.total = self.items.iter().map(|item| item.price).sum();
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseToken {
    pub id: Uuid,
    pub user_id: u64,
    pub tour_id: u64,
    pub purchase_time: DateTime<Utc>,
}

impl PurchaseToken {
    pub fn mint(user_id: u64, tour_id: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            tour_id,
            purchase_time: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    pub tokens: Vec<Uuid>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(tour_id: u64, price: f64) -> OrderItem {
        OrderItem {
            tour_id,
            name: format!("tour {tour_id}"),
            price,
        }
    }

    #[test]
    fn total_follows_items() {
        let now = Utc::now();
        let mut cart = ShoppingCart::empty(1, now);
        cart.add(item(1, 12.5), now).unwrap();
        cart.add(item(2, 7.5), now).unwrap();
        assert_eq!(cart.total, 20.0);

        let removed = cart.remove(1, now).unwrap();
        assert_eq!(removed.tour_id, 1);
        assert_eq!(cart.total, 7.5);
    }

    #[test]
    fn duplicate_and_missing_items_are_rejected() {
        let now = Utc::now();
        let mut cart = ShoppingCart::empty(1, now);
        cart.add(item(1, 1.0), now).unwrap();
        assert!(matches!(
            cart.add(item(1, 1.0), now),
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(cart.remove(2, now), Err(ServiceError::NotFound(_))));
    }
}
