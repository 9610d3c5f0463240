use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::{
    domain::{CartCommand, CheckoutReceipt, OrderItem, ShoppingCart, TourStatus},
    error::{Result, ServiceError},
    purchase::PurchaseGate,
    store::{CartRepository, CheckoutOutcome, TourRepository},
};

/// Shopping cart and checkout. Purchase tokens minted here are what the
/// local purchase gate answers from.
#[derive(Clone)]
pub struct CartService {
    carts: Arc<dyn CartRepository>,
    tours: Arc<dyn TourRepository>,
}

impl CartService {
    pub fn new(carts: Arc<dyn CartRepository>, tours: Arc<dyn TourRepository>) -> Self {
        Self { carts, tours }
    }

    pub async fn cart(&self, user_id: u64) -> Result<ShoppingCart> {
        Ok(self
            .carts
            .get_cart(user_id)
            .await?
            .unwrap_or_else(|| ShoppingCart::empty(user_id, Utc::now())))
    }

    pub async fn add_item(&self, user_id: u64, tour_id: u64) -> Result<ShoppingCart> {
        let tour = self
            .tours
            .get(tour_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("tour {tour_id}")))?;
        if tour.status != TourStatus::Published {
            return Err(ServiceError::invalid_state(format!(
                "tour {tour_id} is not published"
            )));
        }

        let cart = self
            .carts
            .apply_cart(
                user_id,
                CartCommand::Add(OrderItem {
                    tour_id,
                    name: tour.name,
                    price: tour.price,
                }),
            )
            .await?;

        info!(user_id, tour_id, total = cart.total, "tour added to cart");
        Ok(cart)
    }

    pub async fn remove_item(&self, user_id: u64, tour_id: u64) -> Result<ShoppingCart> {
        self.carts
            .apply_cart(user_id, CartCommand::Remove { tour_id })
            .await
    }

    pub async fn checkout(&self, user_id: u64) -> Result<CheckoutReceipt> {
        let CheckoutOutcome { cart, tokens } = self.carts.checkout(user_id).await?;

        info!(user_id, items = cart.items.len(), total = cart.total, "checkout completed");
        Ok(CheckoutReceipt {
            message: format!(
                "Purchase successful. {} items bought for {:.2}.",
                cart.items.len(),
                cart.total
            ),
            tokens: tokens.iter().map(|token| token.id).collect(),
        })
    }

    pub async fn has_purchased(&self, user_id: u64, tour_id: u64) -> Result<bool> {
        self.carts.has_token(user_id, tour_id).await
    }
}

#[async_trait]
impl PurchaseGate for CartService {
    async fn is_entitled(&self, tourist_id: u64, tour_id: u64) -> Result<bool> {
        self.has_purchased(tourist_id, tour_id).await
    }
}
