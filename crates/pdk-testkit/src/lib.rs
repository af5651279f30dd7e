//! Test harness for the lifecycle engine: an in-memory store, a settable
//! clock, recording notifiers and a few fixtures.

mod clock;
mod memory_store;
mod notifier;

pub use clock::FixedClock;
pub use memory_store::{MemoryState, MemoryStore, MemoryTx};
pub use notifier::{FailingNotifier, RecordingNotifier};

use std::sync::Arc;

use chrono::NaiveDate;
use pdk_engine::{DailyScheduler, EngineResult, LifecycleEngine, NotificationDispatcher, Notifier};
use pdk_schemas::{Actor, Order, OrderStatus, Pole, PoleStatus, ProofType, UserRef, UserRole};
use uuid::Uuid;

/// Parse `YYYY-MM-DD`. Panics on bad input; fixtures only.
pub fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_else(|_| panic!("bad fixture date {s:?}"))
}

pub fn pole(code: &str) -> Pole {
    Pole {
        pole_id: Uuid::new_v4(),
        code: code.to_string(),
        latitude: 40.4168,
        longitude: -3.7038,
        status: PoleStatus::Available,
        deleted_at: None,
    }
}

/// Engine wired to a [`MemoryStore`] and a [`FixedClock`].
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub engine: Arc<LifecycleEngine<MemoryStore>>,
}

impl Harness {
    pub fn new(today: NaiveDate) -> Self {
        let notifier = Arc::new(RecordingNotifier::new());
        Self::with_notifier(today, notifier.clone(), notifier)
    }

    /// Deliver through `sink` while keeping a (possibly unused) recorder.
    pub fn with_notifier(
        today: NaiveDate,
        sink: Arc<dyn Notifier>,
        notifier: Arc<RecordingNotifier>,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::on(today));
        let engine = Arc::new(LifecycleEngine::new(
            Arc::clone(&store),
            clock.clone(),
            NotificationDispatcher::new(sink),
        ));
        Self {
            store,
            clock,
            notifier,
            engine,
        }
    }

    pub fn scheduler(&self) -> Arc<DailyScheduler<MemoryStore>> {
        Arc::new(DailyScheduler::new(Arc::clone(&self.engine)))
    }

    pub async fn add_pole(&self, code: &str) -> Uuid {
        let p = pole(code);
        let id = p.pole_id;
        self.store.seed_pole(p).await;
        id
    }

    /// Seed an active user and return it as an acting identity.
    pub async fn add_user(&self, role: UserRole) -> Actor {
        let user_id = Uuid::new_v4();
        self.store
            .seed_user(UserRef {
                user_id,
                role,
                display_name: format!("{role} {}", &user_id.simple().to_string()[..6]),
                active: true,
            })
            .await;
        Actor::user(user_id, role)
    }

    pub async fn admin(&self) -> Actor {
        self.add_user(UserRole::Admin).await
    }

    pub async fn operator(&self) -> Actor {
        self.add_user(UserRole::Operator).await
    }

    /// Drive an order along the happy path until it reaches `target`,
    /// acting as a fresh admin and supplying whatever evidence each step
    /// needs. Stops early at a terminal status.
    pub async fn walk_to(&self, order_id: Uuid, target: OrderStatus) -> EngineResult<Order> {
        let admin = self.admin().await;
        let mut order = self.engine.get_order(order_id).await?;
        while order.status != target {
            let next = match order.status {
                OrderStatus::Scheduled => OrderStatus::Pending,
                OrderStatus::Pending => {
                    if order.printer_id.is_none() {
                        let printer = self.add_user(UserRole::Printer).await;
                        self.engine
                            .assign_printer(order_id, id_of(&printer), &admin)
                            .await?;
                    }
                    OrderStatus::Printing
                }
                OrderStatus::Printing => {
                    if order.field_user_id.is_none() {
                        let field = self.add_user(UserRole::Field).await;
                        self.engine
                            .assign_field_team(order_id, id_of(&field), &admin)
                            .await?;
                    }
                    OrderStatus::AwaitingMount
                }
                OrderStatus::AwaitingMount => {
                    self.engine
                        .record_proof(order_id, ProofType::ProofMount, "s3://proofs/mount.jpg", &admin)
                        .await?;
                    OrderStatus::Live
                }
                OrderStatus::Live => OrderStatus::Expired,
                OrderStatus::Expired => {
                    self.engine
                        .record_proof(
                            order_id,
                            ProofType::ProofDismount,
                            "s3://proofs/dismount.jpg",
                            &admin,
                        )
                        .await?;
                    OrderStatus::Completed
                }
                OrderStatus::Completed | OrderStatus::Cancelled => return Ok(order),
            };
            order = self
                .engine
                .transition_status(order_id, next, &admin, None)
                .await?;
        }
        Ok(order)
    }
}

/// Actor's user id. Panics for the system actor; fixtures only.
pub fn id_of(actor: &Actor) -> Uuid {
    actor
        .user_id()
        .unwrap_or_else(|| panic!("system actor has no user id"))
}
