use ts_core::entity::EntityId;

/// What kind of simulation event occurred.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEventKind {
    // Production
    /// A generator or producer credited output.
    Produced {
        /// The producing building.
        entity: EntityId,
        /// The commodity credited.
        commodity: EntityId,
        /// Units credited.
        amount: u32,
    },

    // Trade
    /// A trader took stock out of a market's commons.
    Bought {
        /// The buying trader.
        trader: EntityId,
        /// The market traded against.
        market: EntityId,
        /// The commodity bought.
        commodity: EntityId,
        /// Units bought.
        amount: u32,
        /// Unit price paid.
        price: f64,
    },
    /// A trader deposited stock into a market's commons.
    Sold {
        /// The selling trader.
        trader: EntityId,
        /// The market traded against.
        market: EntityId,
        /// The commodity sold.
        commodity: EntityId,
        /// Units sold.
        amount: u32,
        /// Unit price received.
        price: f64,
    },

    // Merchants
    /// A merchant reached a stop and started trading.
    Arrived {
        /// The merchant.
        merchant: EntityId,
        /// The stop's destination.
        at: EntityId,
    },
    /// A merchant finished trading and left a stop.
    Departed {
        /// The merchant.
        merchant: EntityId,
        /// The stop's destination.
        from: EntityId,
    },

    // Buildings
    /// A blueprint was placed on the map.
    Placed {
        /// The new building.
        entity: EntityId,
        /// The blueprint it was copied from.
        blueprint: EntityId,
    },
    /// An entity was removed from the world.
    Destroyed {
        /// The removed entity.
        entity: EntityId,
    },

    // Growth
    /// A market's population changed.
    PopulationChanged {
        /// The market.
        market: EntityId,
        /// Population after the change.
        population: u32,
    },
    /// Growth placed a new dwelling.
    DwellingSpawned {
        /// The market that grew.
        market: EntityId,
        /// The new dwelling.
        dwelling: EntityId,
    },
}

impl SimEventKind {
    /// Check whether a given entity is involved in this event.
    pub fn involves(&self, id: EntityId) -> bool {
        match self {
            Self::Produced { entity, commodity, .. } => *entity == id || *commodity == id,
            Self::Bought {
                trader,
                market,
                commodity,
                ..
            }
            | Self::Sold {
                trader,
                market,
                commodity,
                ..
            } => *trader == id || *market == id || *commodity == id,
            Self::Arrived { merchant, at } => *merchant == id || *at == id,
            Self::Departed { merchant, from } => *merchant == id || *from == id,
            Self::Placed { entity, blueprint } => *entity == id || *blueprint == id,
            Self::Destroyed { entity } => *entity == id,
            Self::PopulationChanged { market, .. } => *market == id,
            Self::DwellingSpawned { market, dwelling } => *market == id || *dwelling == id,
        }
    }
}

/// A record of something that happened during simulation.
#[derive(Debug, Clone)]
pub struct SimEvent {
    /// The simulation tick when this event occurred.
    pub tick: u64,
    /// The specific kind of event that occurred.
    pub kind: SimEventKind,
    /// A human-readable description of the event.
    pub description: String,
}

impl SimEvent {
    /// Create a new simulation event with the given tick, kind, and description.
    pub fn new(tick: u64, kind: SimEventKind, description: impl Into<String>) -> Self {
        Self {
            tick,
            kind,
            description: description.into(),
        }
    }
}

/// Accumulates events during a simulation run.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<SimEvent>,
    max_events: usize,
}

impl EventLog {
    /// Create a new event log with the given maximum capacity (0 = unlimited).
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Vec::new(),
            max_events,
        }
    }

    /// Append an event, dropping the oldest events if the log exceeds its capacity.
    pub fn push(&mut self, event: SimEvent) {
        self.events.push(event);
        if self.max_events > 0 && self.events.len() > self.max_events {
            let drain_count = self.events.len() - self.max_events;
            self.events.drain(..drain_count);
        }
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    /// Return all events that occurred at the given tick.
    pub fn events_at_tick(&self, tick: u64) -> Vec<&SimEvent> {
        self.events.iter().filter(|e| e.tick == tick).collect()
    }

    /// Return all events involving the given entity.
    pub fn events_for_entity(&self, id: EntityId) -> Vec<&SimEvent> {
        self.events.iter().filter(|e| e.kind.involves(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
