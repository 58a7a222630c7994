use crate::db_types::Order;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderCreatedEvent {
    pub order: Order,
}

impl OrderCreatedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderClosedEvent {
    pub order: Order,
}

impl OrderClosedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}
