//! Bill of a dining session.
use crate::models::{
    ChargeKind, DiningSession, Discount, ExtraCharge, Order, OrderStatus, Package, Promotion,
};

#[derive(Debug, PartialEq, Clone)]
pub struct Bill {
    pub items_cents: i64,
    pub package_cents: i64,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub charges: Vec<BillCharge>,
    pub total_cents: i64,
}

#[derive(Debug, PartialEq, Clone)]
pub struct BillCharge {
    pub name: String,
    pub amount_cents: i64,
}

/// Whole percent of a cent amount, rounded half up.
fn percent_of(amount: i64, percent: i64) -> i64 {
    (amount * percent + 50).div_euclid(100)
}

pub fn compute_bill(
    session: &DiningSession,
    package: Option<&Package>,
    orders: &[Order],
    promotion: Option<&Promotion>,
    extra_charges: &[ExtraCharge],
) -> Bill {
    let guests = i64::from(session.guest_count.max(0));

    let items_cents: i64 = orders
        .iter()
        .filter(|o| o.status != OrderStatus::Cancelled)
        .flat_map(|o| o.items.iter())
        .filter(|i| !i.included_in_package)
        .map(|i| i.unit_price_cents * i64::from(i.quantity))
        .sum();

    let package_cents = package.map_or(0, |p| p.price_per_guest_cents * guests);
    let subtotal_cents = items_cents + package_cents;

    let discount_cents = match promotion.map(|p| p.discount) {
        Some(Discount::Percent(percent)) => percent_of(subtotal_cents, percent.clamp(0, 100)),
        Some(Discount::Fixed(cents)) => cents.clamp(0, subtotal_cents),
        None => 0,
    };

    let base = subtotal_cents - discount_cents;
    let charges: Vec<BillCharge> = extra_charges
        .iter()
        .filter(|c| c.active)
        .map(|c| BillCharge {
            name: c.name.clone(),
            amount_cents: match c.kind {
                ChargeKind::Percent => percent_of(base, c.amount),
                ChargeKind::Fixed => c.amount,
                ChargeKind::PerGuest => c.amount * guests,
            },
        })
        .collect();

    let total_cents = base + charges.iter().map(|c| c.amount_cents).sum::<i64>();

    Bill {
        items_cents,
        package_cents,
        subtotal_cents,
        discount_cents,
        charges,
        total_cents,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::{KitchenStatus, OrderItem, SessionStatus};

    fn session(guests: i32) -> DiningSession {
        DiningSession {
            id: 1,
            table_id: 1,
            table_name: "A1".to_owned(),
            package_id: None,
            guest_count: guests,
            token: "token".to_owned(),
            status: SessionStatus::Open,
            promotion_id: None,
            opened_at: Utc::now(),
            closed_at: None,
            total_cents: None,
        }
    }

    fn item(price: i64, quantity: i32, included: bool) -> OrderItem {
        OrderItem {
            id: 0,
            order_id: 1,
            menu_item_id: Some(1),
            name: "Item".to_owned(),
            unit_price_cents: price,
            quantity,
            note: None,
            included_in_package: included,
            kitchen_status: KitchenStatus::Served,
        }
    }

    fn order(status: OrderStatus, items: Vec<OrderItem>) -> Order {
        Order {
            id: 1,
            session_id: 1,
            status,
            note: None,
            created_at: Utc::now(),
            items,
        }
    }

    fn charge(kind: ChargeKind, amount: i64) -> ExtraCharge {
        ExtraCharge {
            id: 1,
            name: kind.as_str().to_owned(),
            kind,
            amount,
            active: true,
        }
    }

    fn promotion(discount: Discount) -> Promotion {
        Promotion {
            id: 1,
            name: "Promo".to_owned(),
            code: None,
            discount,
            starts_at: None,
            ends_at: None,
            active: true,
        }
    }

    #[test]
    fn sums_a_la_carte_items() {
        let orders = vec![order(
            OrderStatus::Served,
            vec![item(1200, 2, false), item(350, 1, false)],
        )];
        let bill = compute_bill(&session(2), None, &orders, None, &[]);
        assert_eq!(bill.items_cents, 2750);
        assert_eq!(bill.total_cents, 2750);
    }

    #[test]
    fn buffet_items_are_covered_by_package_price() {
        let package = Package {
            id: 1,
            name: "Buffet".to_owned(),
            description: String::new(),
            price_per_guest_cents: 29900,
            active: true,
            menu_item_ids: vec![1],
        };
        let orders = vec![order(
            OrderStatus::Served,
            vec![item(15000, 3, true), item(500, 2, false)],
        )];

        let bill = compute_bill(&session(3), Some(&package), &orders, None, &[]);
        assert_eq!(bill.items_cents, 1000);
        assert_eq!(bill.package_cents, 89700);
        assert_eq!(bill.subtotal_cents, 90700);
    }

    #[test]
    fn cancelled_orders_are_not_billed() {
        let orders = vec![
            order(OrderStatus::Cancelled, vec![item(1000, 1, false)]),
            order(OrderStatus::Served, vec![item(400, 1, false)]),
        ];
        let bill = compute_bill(&session(1), None, &orders, None, &[]);
        assert_eq!(bill.total_cents, 400);
    }

    #[test]
    fn percent_discount_then_service_charge() {
        let orders = vec![order(OrderStatus::Served, vec![item(10000, 1, false)])];
        let bill = compute_bill(
            &session(2),
            None,
            &orders,
            Some(&promotion(Discount::Percent(10))),
            &[charge(ChargeKind::Percent, 10), charge(ChargeKind::PerGuest, 50)],
        );

        assert_eq!(bill.discount_cents, 1000);
        assert_eq!(bill.charges[0].amount_cents, 900);
        assert_eq!(bill.charges[1].amount_cents, 100);
        assert_eq!(bill.total_cents, 10000 - 1000 + 900 + 100);
    }

    #[test]
    fn fixed_discount_never_exceeds_subtotal() {
        let orders = vec![order(OrderStatus::Served, vec![item(300, 1, false)])];
        let bill = compute_bill(
            &session(1),
            None,
            &orders,
            Some(&promotion(Discount::Fixed(1000))),
            &[],
        );
        assert_eq!(bill.discount_cents, 300);
        assert_eq!(bill.total_cents, 0);
    }

    #[test]
    fn inactive_charges_are_skipped_and_rounding_is_half_up() {
        let orders = vec![order(OrderStatus::Served, vec![item(105, 1, false)])];
        let mut inactive = charge(ChargeKind::Fixed, 1000);
        inactive.active = false;

        let bill = compute_bill(
            &session(1),
            None,
            &orders,
            None,
            &[charge(ChargeKind::Percent, 10), inactive],
        );
        // 10.5 cents rounds to 11
        assert_eq!(bill.charges.len(), 1);
        assert_eq!(bill.charges[0].amount_cents, 11);
        assert_eq!(bill.total_cents, 116);
    }
}
