//! Cart of order lines a guest or waiter collects before submitting an order.
use crate::models::{MenuItem, NewOrderItem, Package};

/// Largest quantity of a single line, also after merging.
pub const MAX_LINE_QUANTITY: i32 = 99;

#[derive(Debug, PartialEq, Clone)]
pub struct CartLine {
    pub menu_item_id: u64,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i32,
    pub note: Option<String>,
    pub included_in_package: bool,
}

impl CartLine {
    pub fn for_menu_item(
        item: &MenuItem,
        quantity: i32,
        note: Option<String>,
        package: Option<&Package>,
    ) -> Self {
        Self {
            menu_item_id: item.id,
            name: item.name.clone(),
            unit_price_cents: item.price_cents,
            quantity,
            note: normalize_note(note),
            included_in_package: package.map_or(false, |p| p.includes(item.id)),
        }
    }

    fn merges_with(&self, other: &CartLine) -> bool {
        self.menu_item_id == other.menu_item_id && self.note == other.note
    }
}

fn normalize_note(note: Option<String>) -> Option<String> {
    note.map(|n| n.trim().to_owned()).filter(|n| !n.is_empty())
}

#[derive(Debug, Default, PartialEq, Clone)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines for the same menu item with the same note are merged by adding up
    /// their quantities, anything else is appended.
    pub fn add(&mut self, line: CartLine) {
        if line.quantity <= 0 {
            return;
        }

        match self.lines.iter_mut().find(|l| l.merges_with(&line)) {
            Some(existing) => existing.quantity += line.quantity,
            None => self.lines.push(line),
        }
    }

    /// A quantity of zero removes the line.
    pub fn set_quantity(&mut self, menu_item_id: u64, note: Option<&str>, quantity: i32) {
        let position = self
            .lines
            .iter()
            .position(|l| l.menu_item_id == menu_item_id && l.note.as_deref() == note);

        if let Some(position) = position {
            if quantity <= 0 {
                self.lines.remove(position);
            } else {
                self.lines[position].quantity = quantity;
            }
        }
    }

    pub fn exceeds_line_quantity(&self) -> bool {
        self.lines.iter().any(|l| l.quantity > MAX_LINE_QUANTITY)
    }

    pub fn item_count(&self) -> i32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Total without lines included in the buffet package.
    pub fn total_cents(&self) -> i64 {
        self.lines
            .iter()
            .filter(|l| !l.included_in_package)
            .map(|l| l.unit_price_cents * i64::from(l.quantity))
            .sum()
    }

    pub fn into_order_items(self) -> Vec<NewOrderItem> {
        self.lines
            .into_iter()
            .map(|l| NewOrderItem {
                menu_item_id: l.menu_item_id,
                name: l.name,
                unit_price_cents: l.unit_price_cents,
                quantity: l.quantity,
                note: l.note,
                included_in_package: l.included_in_package,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu_item(id: u64, price: i64) -> MenuItem {
        MenuItem {
            id,
            category_id: None,
            name: format!("Dish {}", id),
            description: String::new(),
            price_cents: price,
            image_url: None,
            available: true,
        }
    }

    fn buffet() -> Package {
        Package {
            id: 1,
            name: "Buffet".to_owned(),
            description: String::new(),
            price_per_guest_cents: 29900,
            active: true,
            menu_item_ids: vec![2],
        }
    }

    #[test]
    fn same_item_and_note_merge() {
        let mut cart = Cart::new();
        cart.add(CartLine::for_menu_item(&menu_item(1, 500), 1, None, None));
        cart.add(CartLine::for_menu_item(&menu_item(1, 500), 2, None, None));
        cart.add(CartLine::for_menu_item(&menu_item(1, 500), 1, Some("no chili".to_owned()), None));
        cart.add(CartLine::for_menu_item(&menu_item(1, 500), 1, Some(" no chili ".to_owned()), None));

        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.lines()[0].quantity, 3);
        assert_eq!(cart.lines()[1].quantity, 2);
        assert_eq!(cart.lines()[1].note.as_deref(), Some("no chili"));
        assert_eq!(cart.item_count(), 5);
    }

    #[test]
    fn blank_note_equals_no_note() {
        let mut cart = Cart::new();
        cart.add(CartLine::for_menu_item(&menu_item(1, 500), 1, Some("  ".to_owned()), None));
        cart.add(CartLine::for_menu_item(&menu_item(1, 500), 1, None, None));
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, 2);
    }

    #[test]
    fn insertion_order_is_kept() {
        let mut cart = Cart::new();
        cart.add(CartLine::for_menu_item(&menu_item(3, 100), 1, None, None));
        cart.add(CartLine::for_menu_item(&menu_item(1, 100), 1, None, None));
        cart.add(CartLine::for_menu_item(&menu_item(3, 100), 1, None, None));

        let ids: Vec<u64> = cart.lines().iter().map(|l| l.menu_item_id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn total_excludes_buffet_items() {
        let package = buffet();
        let mut cart = Cart::new();
        cart.add(CartLine::for_menu_item(&menu_item(1, 500), 2, None, Some(&package)));
        cart.add(CartLine::for_menu_item(&menu_item(2, 15000), 4, None, Some(&package)));

        assert!(!cart.lines()[0].included_in_package);
        assert!(cart.lines()[1].included_in_package);
        assert_eq!(cart.total_cents(), 1000);
    }

    #[test]
    fn zero_quantity_removes_line() {
        let mut cart = Cart::new();
        cart.add(CartLine::for_menu_item(&menu_item(1, 500), 2, None, None));
        cart.add(CartLine::for_menu_item(&menu_item(2, 700), 1, None, None));

        cart.set_quantity(1, None, 5);
        assert_eq!(cart.lines()[0].quantity, 5);

        cart.set_quantity(1, None, 0);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].menu_item_id, 2);
    }

    #[test]
    fn merged_lines_can_exceed_line_limit() {
        let mut cart = Cart::new();
        cart.add(CartLine::for_menu_item(&menu_item(1, 500), MAX_LINE_QUANTITY, None, None));
        assert!(!cart.exceeds_line_quantity());

        cart.add(CartLine::for_menu_item(&menu_item(1, 500), 1, None, None));
        assert!(cart.exceeds_line_quantity());
    }

    #[test]
    fn non_positive_quantities_are_ignored() {
        let mut cart = Cart::new();
        cart.add(CartLine::for_menu_item(&menu_item(1, 500), 0, None, None));
        cart.add(CartLine::for_menu_item(&menu_item(1, 500), -2, None, None));
        assert!(cart.is_empty());
    }

    #[test]
    fn converts_to_order_items() {
        let mut cart = Cart::new();
        cart.add(CartLine::for_menu_item(&menu_item(1, 500), 2, Some("extra rice".to_owned()), None));

        let items = cart.into_order_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].menu_item_id, 1);
        assert_eq!(items[0].quantity, 2);
        assert_eq!(items[0].unit_price_cents, 500);
        assert_eq!(items[0].note.as_deref(), Some("extra rice"));
    }
}
