use tracing::{debug, trace};
use ts_core::component::{Demander, Generator, Ghost, Inventory, Producer, Site};
use ts_core::entity::EntityId;
use ts_core::world::World;

use crate::context::SimContext;
use crate::error::SimResult;
use crate::event::SimEventKind;
use crate::system::System;

/// Advance a generator by `delta` seconds. Returns the whole units completed.
///
/// Fractional progress carries over, so no output is ever lost to rounding.
pub fn advance_generator(generator: &mut Generator, delta: f64) -> u32 {
    generator.progress += generator.rate * delta;
    let whole = generator.progress.floor();
    generator.progress -= whole;
    whole as u32
}

/// Run a producer for `delta` seconds against `inventory`. Returns the
/// number of completed cycles.
///
/// Inputs are deducted all at once when a cycle starts and outputs are
/// credited when it completes. Leftover time starts the next cycle if the
/// inputs are there; otherwise the producer waits with its stock untouched.
pub fn run_producer(producer: &mut Producer, inventory: &mut Inventory, delta: f64) -> u32 {
    let mut budget = producer.rate * delta;
    let mut cycles = 0;
    loop {
        if !producer.producing {
            if !inventory.take_all(&producer.inputs) {
                break;
            }
            producer.producing = true;
            producer.progress = 0.0;
        }
        let remaining = 1.0 - producer.progress;
        if budget < remaining {
            producer.progress += budget;
            break;
        }
        budget -= remaining;
        inventory.add_all(&producer.outputs);
        producer.producing = false;
        producer.progress = 0.0;
        cycles += 1;
    }
    cycles
}

/// Consume from `inventory` at the demander's rates for `delta` seconds.
///
/// Whole units are eaten as they accumulate; missing stock goes unconsumed
/// and is not owed later.
pub fn consume(demander: &mut Demander, inventory: &mut Inventory, delta: f64) {
    for (commodity, rate) in &demander.rate {
        let owed = demander.consumed.entry(*commodity).or_insert(0.0);
        *owed += rate * delta;
        let whole = owed.floor();
        if whole >= 1.0 {
            let eaten = (whole as u32).min(inventory.count(*commodity));
            inventory.take(*commodity, eaten);
            *owed -= whole;
        }
    }
}

/// Placed entities carrying `T`. Blueprints and ghosts have no `Site` or
/// carry `Ghost`, so they never run.
fn placed<T: ts_core::Component>(world: &World) -> Vec<EntityId> {
    world
        .entities()
        .view::<(T, Site)>()
        .iter()
        .filter(|e| !world.entities().has::<Ghost>(*e))
        .collect()
}

/// Emits generator output into the building's inventory, or its market's
/// commons when it has none.
#[derive(Debug, Default)]
pub struct GeneratorSystem;

impl GeneratorSystem {
    pub fn new() -> Self {
        Self
    }
}

impl System for GeneratorSystem {
    fn name(&self) -> &str {
        "generators"
    }

    fn tick(&mut self, ctx: &mut SimContext<'_>) -> SimResult<()> {
        for id in placed::<Generator>(ctx.world) {
            let generator = ctx.world.entities_mut().get_mut::<Generator>(id)?;
            let units = advance_generator(generator, ctx.delta);
            let output = generator.output;
            if units == 0 {
                continue;
            }

            let target = if ctx.world.entities().has::<Inventory>(id) {
                Some(id)
            } else {
                ctx.world
                    .market_of(id)
                    .and_then(|m| ctx.world.commons_of(m).ok())
            };
            let Some(target) = target else {
                debug!(generator = %id, units, "output discarded, nowhere to store it");
                continue;
            };
            ctx.world
                .entities_mut()
                .get_mut::<Inventory>(target)?
                .add(output, units);

            let description = format!(
                "{} produced {units} {}",
                ctx.name_of(id),
                ctx.name_of(output)
            );
            ctx.emit(
                SimEventKind::Produced {
                    entity: id,
                    commodity: output,
                    amount: units,
                },
                description,
            );
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Runs every placed producer against its own inventory.
#[derive(Debug, Default)]
pub struct ProducerSystem;

impl ProducerSystem {
    pub fn new() -> Self {
        Self
    }
}

impl System for ProducerSystem {
    fn name(&self) -> &str {
        "producers"
    }

    fn tick(&mut self, ctx: &mut SimContext<'_>) -> SimResult<()> {
        for id in placed::<Producer>(ctx.world) {
            let Some(mut inventory) = ctx.world.entities().try_get::<Inventory>(id).cloned()
            else {
                trace!(producer = %id, "producer without inventory");
                continue;
            };
            let mut producer = ctx.world.entities().get::<Producer>(id)?.clone();
            let was_producing = producer.producing;
            let cycles = run_producer(&mut producer, &mut inventory, ctx.delta);
            if producer.producing && !was_producing && cycles == 0 {
                debug!(producer = %id, "inputs deducted, cycle started");
            }

            let outputs = producer.outputs.clone();
            *ctx.world.entities_mut().get_mut::<Producer>(id)? = producer;
            *ctx.world.entities_mut().get_mut::<Inventory>(id)? = inventory;

            if cycles == 0 {
                continue;
            }
            for (commodity, amount) in outputs {
                let amount = amount * cycles;
                let description = format!(
                    "{} produced {amount} {}",
                    ctx.name_of(id),
                    ctx.name_of(commodity)
                );
                ctx.emit(
                    SimEventKind::Produced {
                        entity: id,
                        commodity,
                        amount,
                    },
                    description,
                );
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Demanders eat from their own stock.
#[derive(Debug, Default)]
pub struct ConsumptionSystem;

impl ConsumptionSystem {
    pub fn new() -> Self {
        Self
    }
}

impl System for ConsumptionSystem {
    fn name(&self) -> &str {
        "consumption"
    }

    fn tick(&mut self, ctx: &mut SimContext<'_>) -> SimResult<()> {
        for id in placed::<Demander>(ctx.world) {
            let Some(mut inventory) = ctx.world.entities().try_get::<Inventory>(id).cloned()
            else {
                continue;
            };
            let mut demander = ctx.world.entities().get::<Demander>(id)?.clone();
            consume(&mut demander, &mut inventory, ctx.delta);
            *ctx.world.entities_mut().get_mut::<Demander>(id)? = demander;
            *ctx.world.entities_mut().get_mut::<Inventory>(id)? = inventory;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use ts_core::Registry;
    use ts_core::component::Amounts;

    fn commodities<const N: usize>() -> [EntityId; N] {
        let mut registry = Registry::new();
        std::array::from_fn(|_| registry.create())
    }

    fn workshop(wood: EntityId, stone: EntityId, tools: EntityId, rate: f64) -> Producer {
        Producer {
            inputs: [(wood, 2), (stone, 1)].into_iter().collect(),
            outputs: [(tools, 1)].into_iter().collect(),
            rate,
            producing: false,
            progress: 0.0,
        }
    }

    fn stocked(amounts: &[(EntityId, u32)]) -> Inventory {
        Inventory {
            stock: amounts.iter().copied().collect::<Amounts>(),
        }
    }

    #[test]
    fn generator_emits_whole_units_and_keeps_the_rest() {
        let [grain] = commodities();
        let mut generator = Generator {
            output: grain,
            rate: 0.4,
            progress: 0.0,
        };
        assert_eq!(advance_generator(&mut generator, 1.0), 0);
        assert_eq!(advance_generator(&mut generator, 1.0), 0);
        assert_eq!(advance_generator(&mut generator, 1.0), 1);
        assert!((generator.progress - 0.2).abs() < 1e-9);
        assert_eq!(advance_generator(&mut generator, 10.0), 4);
    }

    #[test]
    fn producer_completes_a_cycle_and_rechecks_inputs() {
        let [wood, stone, tools] = commodities();
        let mut producer = workshop(wood, stone, tools, 1.0);
        let mut inventory = stocked(&[(wood, 2), (stone, 1)]);

        let cycles = run_producer(&mut producer, &mut inventory, 1.0);
        assert_eq!(cycles, 1);
        assert_eq!(inventory.count(wood), 0);
        assert_eq!(inventory.count(stone), 0);
        assert_eq!(inventory.count(tools), 1);
        // Inputs were re-checked and found missing.
        assert!(!producer.producing);
    }

    #[test]
    fn producer_holds_inputs_while_producing() {
        let [wood, stone, tools] = commodities();
        let mut producer = workshop(wood, stone, tools, 0.5);
        let mut inventory = stocked(&[(wood, 4), (stone, 2)]);

        assert_eq!(run_producer(&mut producer, &mut inventory, 1.0), 0);
        assert!(producer.producing);
        assert!((producer.progress - 0.5).abs() < 1e-9);
        assert_eq!(inventory.count(wood), 2);
        assert_eq!(inventory.count(tools), 0);

        // Completing the first cycle immediately starts the second.
        assert_eq!(run_producer(&mut producer, &mut inventory, 1.0), 1);
        assert_eq!(inventory.count(tools), 1);
        assert!(producer.producing);
        assert_eq!(inventory.count(wood), 0);
        assert_eq!(inventory.count(stone), 0);
    }

    #[test]
    fn producer_waits_without_inputs() {
        let [wood, stone, tools] = commodities();
        let mut producer = workshop(wood, stone, tools, 1.0);
        let mut inventory = stocked(&[(wood, 1), (stone, 5)]);
        let before = inventory.clone();

        assert_eq!(run_producer(&mut producer, &mut inventory, 3.0), 0);
        assert!(!producer.producing);
        assert_eq!(inventory, before);
    }

    #[test]
    fn consumption_eats_whole_units_only() {
        let [bread] = commodities();
        let mut demander = Demander::new([(bread, 0.5)].into_iter().collect());
        let mut inventory = stocked(&[(bread, 3)]);

        consume(&mut demander, &mut inventory, 1.0);
        assert_eq!(inventory.count(bread), 3);
        consume(&mut demander, &mut inventory, 1.0);
        assert_eq!(inventory.count(bread), 2);
        consume(&mut demander, &mut inventory, 10.0);
        assert_eq!(inventory.count(bread), 0);
    }

    proptest! {
        #[test]
        fn generator_accumulation_is_lossless(
            quarter_rate in 1u32..20,
            quarter_delta in 1u32..8,
            ticks in 1usize..50,
            initial_eighths in 0u32..8,
        ) {
            let [grain] = commodities();
            let rate = f64::from(quarter_rate) / 4.0;
            let delta = f64::from(quarter_delta) / 4.0;
            let initial = f64::from(initial_eighths) / 8.0;
            let mut generator = Generator { output: grain, rate, progress: initial };

            let mut emitted = 0u64;
            for _ in 0..ticks {
                emitted += u64::from(advance_generator(&mut generator, delta));
                prop_assert!((0.0..1.0).contains(&generator.progress));
            }
            let expected = (rate * delta * ticks as f64 + initial).floor() as u64;
            prop_assert_eq!(emitted, expected);
        }

        #[test]
        fn producer_stock_never_goes_negative(
            wood_stock in 0u32..10,
            stone_stock in 0u32..5,
            rate in 0.1f64..3.0,
            deltas in prop::collection::vec(0.1f64..2.0, 1..20),
        ) {
            let [wood, stone, tools] = commodities();
            let mut producer = workshop(wood, stone, tools, rate);
            let mut inventory = stocked(&[(wood, wood_stock), (stone, stone_stock)]);
            let mut total_cycles = 0;
            for delta in deltas {
                total_cycles += run_producer(&mut producer, &mut inventory, delta);
            }
            let started = total_cycles + u32::from(producer.producing);
            prop_assert_eq!(inventory.count(wood) + 2 * started, wood_stock);
            prop_assert_eq!(inventory.count(stone) + started, stone_stock);
            prop_assert_eq!(inventory.count(tools), total_cycles);
        }
    }
}
