//! Service wiring: one in-memory instance of every store and engine, shared by
//! all handlers.

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use matflow_core::{CategoryId, DepotId, DomainError, DomainResult, MaterielId};
use matflow_events::{DomainEvent, Event, EventEnvelope, EventSink, InMemoryEventBus};
use matflow_infra::{
    catalog::{CatalogLookup, InMemoryCatalog, MaterialInfo},
    delivery_store::DeliveryNoteStore,
    event_store::InMemoryEventStore,
    fulfillment::FulfillmentProcessor,
    idempotency::IdempotencyStore,
    ledger::{ManualOp, StockLedger},
    request_store::InMemoryRequestStore,
    sequence::SequenceGenerator,
    validation::ValidationEngine,
};
use matflow_stock::MaterialStock;

type Store = Arc<InMemoryEventStore>;
type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

/// [`EventSink`] feeding the realtime SSE channel. Lossy: with no subscriber
/// connected, events are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    tx: broadcast::Sender<DomainEvent>,
}

impl BroadcastEventSink {
    pub fn new(tx: broadcast::Sender<DomainEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: DomainEvent) {
        let event_type = event.event_type();
        if self.tx.send(event).is_err() {
            tracing::debug!(event_type, "no realtime subscriber, event dropped");
        }
    }
}

/// Input of [`AppServices::register_material`].
#[derive(Debug, Clone)]
pub struct MaterialRegistration {
    pub depot_id: DepotId,
    pub name: String,
    pub unit: String,
    pub unit_price: u64,
    pub category_id: Option<CategoryId>,
    pub stock_minimum: i64,
    pub initial_stock: i64,
}

pub struct AppServices {
    pub catalog: Arc<InMemoryCatalog>,
    pub ledger: Arc<StockLedger>,
    pub requests: Arc<InMemoryRequestStore>,
    pub deliveries: Arc<DeliveryNoteStore>,
    pub validation: ValidationEngine<Store, Bus>,
    pub fulfillment: FulfillmentProcessor<Store, Bus>,
    pub idempotency: Arc<IdempotencyStore>,
    realtime_tx: broadcast::Sender<DomainEvent>,
}

pub fn build_services(channel_capacity: usize) -> AppServices {
    // Realtime channel (SSE): lossy broadcast, depot-filtered per subscriber.
    let (realtime_tx, _realtime_rx) = broadcast::channel::<DomainEvent>(channel_capacity.max(1));
    let sink: Arc<dyn EventSink> = Arc::new(BroadcastEventSink::new(realtime_tx.clone()));

    let sequences = Arc::new(SequenceGenerator::new());
    let catalog = Arc::new(InMemoryCatalog::new());
    let lookup: Arc<dyn CatalogLookup> = catalog.clone();
    let ledger = Arc::new(StockLedger::new(sink.clone()));
    let idempotency = Arc::new(IdempotencyStore::new());

    let requests = Arc::new(InMemoryRequestStore::in_memory(
        sequences.clone(),
        lookup.clone(),
        sink.clone(),
    ));
    let deliveries = Arc::new(DeliveryNoteStore::new(sequences));

    let validation = ValidationEngine::new(requests.clone(), ledger.clone(), sink.clone());
    let fulfillment = FulfillmentProcessor::new(
        requests.clone(),
        deliveries.clone(),
        ledger.clone(),
        lookup,
        idempotency.clone(),
        sink,
    );

    AppServices {
        catalog,
        ledger,
        requests,
        deliveries,
        validation,
        fulfillment,
        idempotency,
        realtime_tx,
    }
}

impl AppServices {
    pub fn realtime_tx(&self) -> &broadcast::Sender<DomainEvent> {
        &self.realtime_tx
    }

    /// Register a material in the catalog and open its stock account.
    ///
    /// Opening stock is booked as a `manual_add` so the movement log accounts
    /// for every unit.
    pub fn register_material(
        &self,
        registration: MaterialRegistration,
        op: ManualOp,
    ) -> DomainResult<(MaterialInfo, MaterialStock)> {
        if registration.stock_minimum < 0 {
            return Err(DomainError::invalid_input("stock_minimum cannot be negative"));
        }
        if registration.initial_stock < 0 {
            return Err(DomainError::invalid_input("initial_stock cannot be negative"));
        }

        let info = MaterialInfo {
            id: MaterielId::new(),
            depot_id: registration.depot_id,
            name: registration.name.trim().to_string(),
            unit: registration.unit.trim().to_string(),
            unit_price: registration.unit_price,
            category_id: registration.category_id,
        };
        self.catalog.register_material(info.clone())?;
        let mut stock = self
            .ledger
            .open_material(info.id, info.depot_id, registration.stock_minimum)?;
        if registration.initial_stock > 0 {
            self.ledger.manual_add(info.id, registration.initial_stock, op)?;
            stock = self.ledger.material(info.id)?;
        }

        tracing::info!(
            materiel_id = %info.id,
            depot_id = %info.depot_id,
            name = %info.name,
            stock = stock.stock_current(),
            "material registered"
        );
        Ok((info, stock))
    }
}

/// SSE stream of domain events, limited to `depot` when given.
pub fn depot_sse_stream(
    services: &AppServices,
    depot: Option<DepotId>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>> + use<>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(event) if depot.is_none_or(|d| event.depot_id() == d) => {
            let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(event.event_type()).data(data)))
        }
        Ok(_) => None,
        Err(lagged) => {
            tracing::warn!(error = %lagged, "realtime subscriber lagged");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
