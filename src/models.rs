use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::ServiceError;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Role {
    Admin,
    Manager,
    Staff,
    Kitchen,
}

impl Role {
    /// Whether this role may use routes that require `required`.
    pub fn satisfies(self, required: Role) -> bool {
        match self {
            Role::Admin => true,
            Role::Manager => required != Role::Admin,
            Role::Staff => required == Role::Staff,
            Role::Kitchen => required == Role::Kitchen,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Manager => "Manager",
            Role::Staff => "Staff",
            Role::Kitchen => "Kitchen",
        }
    }
}

impl FromStr for Role {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Admin" => Ok(Role::Admin),
            "Manager" => Ok(Role::Manager),
            "Staff" => Ok(Role::Staff),
            "Kitchen" => Ok(Role::Kitchen),
            _ => Err(unknown_value("role", s)),
        }
    }
}

fn unknown_value(kind: &str, value: &str) -> ServiceError {
    ServiceError::InternalServerError(format!("Unknown {} '{}' in database", kind, value))
}

#[derive(Debug, PartialEq, Clone)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub name: String,
    pub role: Role,
    pub department_id: Option<u64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
    pub valid_until: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct DiningTable {
    pub id: u64,
    pub name: String,
    pub seats: i32,
    pub zone: String,
    pub active: bool,
    pub occupied: bool,
}

#[derive(Debug, PartialEq, Clone)]
pub struct MenuCategory {
    pub id: u64,
    pub name: String,
    pub position: i32,
}

#[derive(Debug, PartialEq, Clone)]
pub struct MenuItem {
    pub id: u64,
    pub category_id: Option<u64>,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub image_url: Option<String>,
    pub available: bool,
}

/// A buffet package, guests pay per head and the listed items are included.
#[derive(Debug, PartialEq, Clone)]
pub struct Package {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub price_per_guest_cents: i64,
    pub active: bool,
    pub menu_item_ids: Vec<u64>,
}

impl Package {
    pub fn includes(&self, menu_item_id: u64) -> bool {
        self.menu_item_ids.contains(&menu_item_id)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Discount {
    /// Whole percent, 1..=100
    Percent(i64),
    Fixed(i64),
}

impl Discount {
    pub fn kind(&self) -> &'static str {
        match self {
            Discount::Percent(_) => "Percent",
            Discount::Fixed(_) => "Fixed",
        }
    }

    pub fn value(&self) -> i64 {
        match self {
            Discount::Percent(v) | Discount::Fixed(v) => *v,
        }
    }

    pub fn from_parts(kind: &str, value: i64) -> Result<Self, ServiceError> {
        match kind {
            "Percent" => Ok(Discount::Percent(value)),
            "Fixed" => Ok(Discount::Fixed(value)),
            _ => Err(unknown_value("discount kind", kind)),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Promotion {
    pub id: u64,
    pub name: String,
    pub code: Option<String>,
    pub discount: Discount,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl Promotion {
    pub fn is_applicable_at(&self, at: DateTime<Utc>) -> bool {
        self.active
            && self.starts_at.map_or(true, |start| start <= at)
            && self.ends_at.map_or(true, |end| at < end)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ChargeKind {
    /// Whole percent of the discounted subtotal
    Percent,
    Fixed,
    PerGuest,
}

impl ChargeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChargeKind::Percent => "Percent",
            ChargeKind::Fixed => "Fixed",
            ChargeKind::PerGuest => "PerGuest",
        }
    }
}

impl FromStr for ChargeKind {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Percent" => Ok(ChargeKind::Percent),
            "Fixed" => Ok(ChargeKind::Fixed),
            "PerGuest" => Ok(ChargeKind::PerGuest),
            _ => Err(unknown_value("charge kind", s)),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct ExtraCharge {
    pub id: u64,
    pub name: String,
    pub kind: ChargeKind,
    pub amount: i64,
    pub active: bool,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SessionStatus {
    Open,
    Closed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Open => "Open",
            SessionStatus::Closed => "Closed",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Open" => Ok(SessionStatus::Open),
            "Closed" => Ok(SessionStatus::Closed),
            _ => Err(unknown_value("session status", s)),
        }
    }
}

/// A group of guests seated at a table, from opening until payment.
#[derive(Debug, PartialEq, Clone)]
pub struct DiningSession {
    pub id: u64,
    pub table_id: u64,
    pub table_name: String,
    pub package_id: Option<u64>,
    pub guest_count: i32,
    pub token: String,
    pub status: SessionStatus,
    pub promotion_id: Option<u64>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub total_cents: Option<i64>,
}

impl DiningSession {
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
pub enum KitchenStatus {
    Waiting,
    Cooking,
    Done,
    Served,
}

impl KitchenStatus {
    pub fn next(self) -> Option<KitchenStatus> {
        match self {
            KitchenStatus::Waiting => Some(KitchenStatus::Cooking),
            KitchenStatus::Cooking => Some(KitchenStatus::Done),
            KitchenStatus::Done => Some(KitchenStatus::Served),
            KitchenStatus::Served => None,
        }
    }

    /// Only the single step forward is allowed.
    pub fn can_transition_to(self, target: KitchenStatus) -> bool {
        self.next() == Some(target)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KitchenStatus::Waiting => "WAITING",
            KitchenStatus::Cooking => "COOKING",
            KitchenStatus::Done => "DONE",
            KitchenStatus::Served => "SERVED",
        }
    }
}

impl FromStr for KitchenStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAITING" => Ok(KitchenStatus::Waiting),
            "COOKING" => Ok(KitchenStatus::Cooking),
            "DONE" => Ok(KitchenStatus::Done),
            "SERVED" => Ok(KitchenStatus::Served),
            _ => Err(unknown_value("kitchen status", s)),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum OrderStatus {
    Pending,
    Preparing,
    Served,
    Cancelled,
}

impl OrderStatus {
    /// Status of a not cancelled order, derived from its item states.
    pub fn derive(items: &[KitchenStatus]) -> OrderStatus {
        if !items.is_empty() && items.iter().all(|s| *s == KitchenStatus::Served) {
            OrderStatus::Served
        } else if items.iter().any(|s| *s != KitchenStatus::Waiting) {
            OrderStatus::Preparing
        } else {
            OrderStatus::Pending
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Preparing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Preparing => "Preparing",
            OrderStatus::Served => "Served",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(OrderStatus::Pending),
            "Preparing" => Ok(OrderStatus::Preparing),
            "Served" => Ok(OrderStatus::Served),
            "Cancelled" => Ok(OrderStatus::Cancelled),
            _ => Err(unknown_value("order status", s)),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct OrderItem {
    pub id: u64,
    pub order_id: u64,
    pub menu_item_id: Option<u64>,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i32,
    pub note: Option<String>,
    pub included_in_package: bool,
    pub kitchen_status: KitchenStatus,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Order {
    pub id: u64,
    pub session_id: u64,
    pub status: OrderStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// An order can only be cancelled before the kitchen touched any item.
    pub fn is_cancellable(&self) -> bool {
        self.status.is_open()
            && self
                .items
                .iter()
                .all(|i| i.kitchen_status == KitchenStatus::Waiting)
    }
}

/// Order items to be inserted, prices are copied from the menu at order time.
#[derive(Debug, PartialEq, Clone)]
pub struct NewOrder {
    pub session_id: u64,
    pub note: Option<String>,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct NewOrderItem {
    pub menu_item_id: u64,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i32,
    pub note: Option<String>,
    pub included_in_package: bool,
}

/// Entry of the kitchen queue
#[derive(Debug, PartialEq, Clone)]
pub struct KitchenTicket {
    pub item: OrderItem,
    pub session_id: u64,
    pub table_name: String,
    pub ordered_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Department {
    pub id: u64,
    pub name: String,
    pub description: String,
}

#[derive(Debug, PartialEq, Clone)]
pub struct TemplateStep {
    pub name: String,
    pub department_id: Option<u64>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct WorkOrderTemplate {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub steps: Vec<TemplateStep>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum WorkOrderStatus {
    Open,
    InProgress,
    Completed,
    Cancelled,
}

impl WorkOrderStatus {
    /// Status of a not cancelled work order, derived from its checkpoints.
    pub fn derive(checkpoints: &[CheckpointStatus]) -> WorkOrderStatus {
        let done = checkpoints
            .iter()
            .filter(|c| **c == CheckpointStatus::Done)
            .count();

        if !checkpoints.is_empty() && done == checkpoints.len() {
            WorkOrderStatus::Completed
        } else if done > 0 {
            WorkOrderStatus::InProgress
        } else {
            WorkOrderStatus::Open
        }
    }

    pub fn is_finished(self) -> bool {
        matches!(self, WorkOrderStatus::Completed | WorkOrderStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkOrderStatus::Open => "Open",
            WorkOrderStatus::InProgress => "InProgress",
            WorkOrderStatus::Completed => "Completed",
            WorkOrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl FromStr for WorkOrderStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Open" => Ok(WorkOrderStatus::Open),
            "InProgress" => Ok(WorkOrderStatus::InProgress),
            "Completed" => Ok(WorkOrderStatus::Completed),
            "Cancelled" => Ok(WorkOrderStatus::Cancelled),
            _ => Err(unknown_value("work order status", s)),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CheckpointStatus {
    Pending,
    Done,
}

impl CheckpointStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointStatus::Pending => "Pending",
            CheckpointStatus::Done => "Done",
        }
    }
}

impl FromStr for CheckpointStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(CheckpointStatus::Pending),
            "Done" => Ok(CheckpointStatus::Done),
            _ => Err(unknown_value("checkpoint status", s)),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Checkpoint {
    pub id: u64,
    pub work_order_id: u64,
    pub position: i32,
    pub name: String,
    pub department_id: Option<u64>,
    pub status: CheckpointStatus,
    pub completed_by: Option<u64>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Comment {
    pub id: u64,
    pub work_order_id: u64,
    pub author_id: Option<u64>,
    pub author_name: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct WorkOrder {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub department_id: Option<u64>,
    pub template_id: Option<u64>,
    pub status: WorkOrderStatus,
    pub created_by: Option<u64>,
    pub due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub checkpoints: Vec<Checkpoint>,
}

impl WorkOrder {
    /// Checks whether `checkpoint_id` may be completed now.
    ///
    /// Checkpoints are worked off in order of their position.
    pub fn check_completable(&self, checkpoint_id: u64) -> Result<&Checkpoint, ServiceError> {
        if self.status.is_finished() {
            return Err(ServiceError::BadRequest("work_order_finished"));
        }

        let checkpoint = self
            .checkpoints
            .iter()
            .find(|c| c.id == checkpoint_id)
            .ok_or(ServiceError::NotFound)?;

        if checkpoint.status == CheckpointStatus::Done {
            return Err(ServiceError::BadRequest("checkpoint_already_done"));
        }

        let earlier_pending = self.checkpoints.iter().any(|c| {
            c.position < checkpoint.position && c.status != CheckpointStatus::Done
        });
        if earlier_pending {
            return Err(ServiceError::BadRequest("previous_checkpoint_pending"));
        }

        Ok(checkpoint)
    }

    pub fn is_overdue_at(&self, at: DateTime<Utc>) -> bool {
        !self.status.is_finished() && self.due_at.map_or(false, |due| due < at)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct DepartmentLoad {
    pub department_id: Option<u64>,
    pub department_name: Option<String>,
    pub open: i64,
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct WorkOrderDashboard {
    pub open: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub overdue: i64,
    pub by_department: Vec<DepartmentLoad>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ActivityLog {
    pub id: u64,
    pub user_id: Option<u64>,
    pub action: String,
    pub entity: String,
    pub entity_id: Option<u64>,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn kitchen_status_moves_one_step_forward() {
        use KitchenStatus::*;

        assert!(Waiting.can_transition_to(Cooking));
        assert!(Cooking.can_transition_to(Done));
        assert!(Done.can_transition_to(Served));

        assert!(!Waiting.can_transition_to(Done));
        assert!(!Waiting.can_transition_to(Served));
        assert!(!Cooking.can_transition_to(Waiting));
        assert!(!Served.can_transition_to(Waiting));
        assert!(!Done.can_transition_to(Done));
        assert_eq!(Served.next(), None);
    }

    #[test]
    fn kitchen_status_text_matches_database() {
        for status in [
            KitchenStatus::Waiting,
            KitchenStatus::Cooking,
            KitchenStatus::Done,
            KitchenStatus::Served,
        ] {
            assert_eq!(status.as_str().parse::<KitchenStatus>(), Ok(status));
        }
        assert!("BURNT".parse::<KitchenStatus>().is_err());
    }

    #[test]
    fn order_status_follows_items() {
        use KitchenStatus::*;

        assert_eq!(OrderStatus::derive(&[Waiting, Waiting]), OrderStatus::Pending);
        assert_eq!(OrderStatus::derive(&[Waiting, Cooking]), OrderStatus::Preparing);
        assert_eq!(OrderStatus::derive(&[Served, Done]), OrderStatus::Preparing);
        assert_eq!(OrderStatus::derive(&[Served, Served]), OrderStatus::Served);
        assert_eq!(OrderStatus::derive(&[]), OrderStatus::Pending);

        assert!(OrderStatus::Pending.is_open());
        assert!(OrderStatus::Preparing.is_open());
        assert!(!OrderStatus::Served.is_open());
        assert!(!OrderStatus::Cancelled.is_open());
    }

    fn order_with(statuses: &[KitchenStatus]) -> Order {
        let items: Vec<OrderItem> = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| OrderItem {
                id: i as u64 + 1,
                order_id: 1,
                menu_item_id: Some(1),
                name: "Pad Thai".to_owned(),
                unit_price_cents: 1200,
                quantity: 1,
                note: None,
                included_in_package: false,
                kitchen_status: *status,
            })
            .collect();

        Order {
            id: 1,
            session_id: 1,
            status: OrderStatus::derive(statuses),
            note: None,
            created_at: Utc::now(),
            items,
        }
    }

    #[test]
    fn only_untouched_orders_are_cancellable() {
        assert!(order_with(&[KitchenStatus::Waiting, KitchenStatus::Waiting]).is_cancellable());
        assert!(!order_with(&[KitchenStatus::Waiting, KitchenStatus::Cooking]).is_cancellable());

        let mut cancelled = order_with(&[KitchenStatus::Waiting]);
        cancelled.status = OrderStatus::Cancelled;
        assert!(!cancelled.is_cancellable());
    }

    #[test]
    fn promotion_window() {
        let now = Utc::now();
        let mut promotion = Promotion {
            id: 1,
            name: "Happy hour".to_owned(),
            code: Some("HAPPY".to_owned()),
            discount: Discount::Percent(10),
            starts_at: Some(now - Duration::hours(1)),
            ends_at: Some(now + Duration::hours(1)),
            active: true,
        };
        assert!(promotion.is_applicable_at(now));
        assert!(!promotion.is_applicable_at(now + Duration::hours(1)));
        assert!(!promotion.is_applicable_at(now - Duration::hours(2)));

        promotion.starts_at = None;
        promotion.ends_at = None;
        assert!(promotion.is_applicable_at(now));

        promotion.active = false;
        assert!(!promotion.is_applicable_at(now));
    }

    #[test]
    fn role_hierarchy() {
        assert!(Role::Admin.satisfies(Role::Admin));
        assert!(Role::Admin.satisfies(Role::Kitchen));
        assert!(Role::Manager.satisfies(Role::Staff));
        assert!(Role::Manager.satisfies(Role::Kitchen));
        assert!(!Role::Manager.satisfies(Role::Admin));
        assert!(Role::Staff.satisfies(Role::Staff));
        assert!(!Role::Staff.satisfies(Role::Kitchen));
        assert!(!Role::Kitchen.satisfies(Role::Staff));
    }

    fn work_order(statuses: &[CheckpointStatus]) -> WorkOrder {
        let now = Utc::now();
        WorkOrder {
            id: 7,
            title: "Onboard supplier".to_owned(),
            description: String::new(),
            department_id: None,
            template_id: None,
            status: WorkOrderStatus::derive(statuses),
            created_by: None,
            due_at: None,
            created_at: now,
            updated_at: now,
            checkpoints: statuses
                .iter()
                .enumerate()
                .map(|(i, status)| Checkpoint {
                    id: 100 + i as u64,
                    work_order_id: 7,
                    position: i as i32,
                    name: format!("Step {}", i + 1),
                    department_id: None,
                    status: *status,
                    completed_by: None,
                    completed_at: None,
                })
                .collect(),
        }
    }

    #[test]
    fn work_order_status_follows_checkpoints() {
        use CheckpointStatus::*;

        assert_eq!(WorkOrderStatus::derive(&[Pending, Pending]), WorkOrderStatus::Open);
        assert_eq!(WorkOrderStatus::derive(&[Done, Pending]), WorkOrderStatus::InProgress);
        assert_eq!(WorkOrderStatus::derive(&[Done, Done]), WorkOrderStatus::Completed);
    }

    #[test]
    fn checkpoints_complete_in_order() {
        use CheckpointStatus::*;

        let order = work_order(&[Done, Pending, Pending]);
        assert_eq!(order.check_completable(101).map(|c| c.id), Ok(101));
        assert_eq!(
            order.check_completable(102),
            Err(ServiceError::BadRequest("previous_checkpoint_pending"))
        );
        assert_eq!(
            order.check_completable(100),
            Err(ServiceError::BadRequest("checkpoint_already_done"))
        );
        assert_eq!(order.check_completable(999), Err(ServiceError::NotFound));
    }

    #[test]
    fn finished_work_orders_are_locked() {
        let mut order = work_order(&[CheckpointStatus::Pending]);
        order.status = WorkOrderStatus::Cancelled;
        assert_eq!(
            order.check_completable(100),
            Err(ServiceError::BadRequest("work_order_finished"))
        );
    }

    #[test]
    fn overdue_only_when_unfinished() {
        let now = Utc::now();
        let mut order = work_order(&[CheckpointStatus::Pending]);
        assert!(!order.is_overdue_at(now));

        order.due_at = Some(now - Duration::days(1));
        assert!(order.is_overdue_at(now));

        order.status = WorkOrderStatus::Completed;
        assert!(!order.is_overdue_at(now));
    }
}
