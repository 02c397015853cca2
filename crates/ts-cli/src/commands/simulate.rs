use std::path::Path;

use colored::Colorize;
use comfy_table::{ContentArrangement, Table};
use serde_json::json;
use tracing::info;
use ts_core::component::{Inventory, Market, Merchant, Site, Trader};
use ts_core::entity::EntityId;
use ts_core::world::World;
use ts_simulation::{SimEventKind, Simulation};

pub struct Options<'a> {
    pub ticks: u64,
    pub dt: f64,
    pub seed: Option<u64>,
    pub config: Option<&'a Path>,
    pub catalog: Option<&'a Path>,
    pub verbose: bool,
    pub json: bool,
}

pub fn run(options: &Options<'_>) -> Result<(), String> {
    let catalog = super::load_catalog(options.catalog)?;
    let mut config = super::load_config(options.config)?;
    if let Some(seed) = options.seed {
        config = config.with_seed(seed);
    }
    let seed = config.seed;

    let mut sim = Simulation::generate(&catalog, config)
        .map_err(|e| format!("world generation failed: {e}"))?;
    info!(ticks = options.ticks, dt = options.dt, seed, "running simulation");
    sim.run(options.ticks, options.dt)
        .map_err(|e| format!("simulation error: {e}"))?;

    if options.json {
        return print_json(&sim);
    }

    println!(
        "  {} {}",
        "Township".bold(),
        format!(
            "({} ticks, dt={}s, seed={seed})",
            options.ticks, options.dt
        )
        .dimmed()
    );
    println!(
        "  {:.0} simulated seconds, {} events logged",
        sim.clock().elapsed_secs(),
        sim.events().len()
    );
    println!();

    print_events(&sim, options.verbose);
    print_markets(sim.world());
    print_merchants(sim.world());
    print_families(&sim);

    Ok(())
}

fn print_events(sim: &Simulation, verbose: bool) {
    let events = sim.events().events();
    if verbose {
        println!("  {}", "Event Log".bold().underline());
        println!();
        for event in events {
            let tick_label = format!("[tick {:>4}]", event.tick).dimmed();
            let desc = colorize_event(&event.kind, &event.description);
            println!("  {tick_label} {desc}");
        }
        if events.is_empty() {
            println!("  {}", "(no events)".dimmed());
        }
        println!();
        return;
    }

    let produced: u32 = events
        .iter()
        .map(|e| match e.kind {
            SimEventKind::Produced { amount, .. } => amount,
            _ => 0,
        })
        .sum();
    let trades = events
        .iter()
        .filter(|e| {
            matches!(
                e.kind,
                SimEventKind::Bought { .. } | SimEventKind::Sold { .. }
            )
        })
        .count();
    println!("  {produced} units produced, {trades} trades settled");
    println!();

    let notable: Vec<_> = events
        .iter()
        .filter(|e| {
            matches!(
                e.kind,
                SimEventKind::PopulationChanged { .. } | SimEventKind::DwellingSpawned { .. }
            )
        })
        .collect();
    if !notable.is_empty() {
        println!("  {}", "Notable Events".bold().underline());
        for event in notable {
            println!(
                "  {} {}",
                format!("[tick {:>4}]", event.tick).dimmed(),
                colorize_event(&event.kind, &event.description)
            );
        }
        println!();
    }
}

fn placed_markets(world: &World) -> Vec<EntityId> {
    world.entities().view::<(Market, Site)>().iter().collect()
}

fn print_markets(world: &World) {
    println!("  {}", "Markets".bold().underline());
    println!();

    let markets = placed_markets(world);
    if markets.is_empty() {
        println!("  {}", "(no markets)".dimmed());
        println!();
        return;
    }

    let mut header = vec!["Market".to_string(), "Pop".to_string()];
    header.extend(world.commodities().iter().map(|c| world.entities().name_of(*c)));
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);

    for market in markets {
        let Some(state) = world.entities().try_get::<Market>(market) else {
            continue;
        };
        let mut row = vec![
            world.entities().name_of(market),
            state.population.to_string(),
        ];
        for commodity in world.commodities() {
            let stock = world.market_stock(market, *commodity).unwrap_or(0);
            row.push(format!(
                "{} ({stock})",
                super::money(state.price_of(*commodity))
            ));
        }
        table.add_row(row);
    }

    println!("{table}");
    println!("  {}", "price (units in reach)".dimmed());
    println!();
}

fn print_merchants(world: &World) {
    let template = world.merchant_blueprint();
    let merchants: Vec<EntityId> = world
        .entities()
        .view::<(Merchant, Trader)>()
        .iter()
        .filter(|m| Some(*m) != template)
        .collect();
    if merchants.is_empty() {
        return;
    }

    println!("  {}", "Merchants".bold().underline());
    println!();
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Merchant", "Family", "Route", "Status", "Cargo", "Balance"]);

    for id in merchants {
        let (Some(merchant), Some(trader)) = (
            world.entities().try_get::<Merchant>(id),
            world.entities().try_get::<Trader>(id),
        ) else {
            continue;
        };
        let family = world
            .family(trader.family)
            .map_or_else(|_| "-".to_string(), |f| f.name.clone());
        let route = merchant
            .route
            .as_ref()
            .map_or_else(|| "-".to_string(), |r| r.name.clone());
        let status = match merchant.next_stop() {
            Some(stop) if merchant.trading => {
                format!("trading at {}", world.entities().name_of(stop.destination))
            }
            Some(stop) => format!("heading to {}", world.entities().name_of(stop.destination)),
            None => "idle".to_string(),
        };
        let cargo = world
            .entities()
            .try_get::<Inventory>(id)
            .map(|inv| cargo_list(world, inv))
            .unwrap_or_default();

        table.add_row(vec![
            world.entities().name_of(id),
            family,
            route,
            status,
            cargo,
            super::money(trader.balance),
        ]);
    }

    println!("{table}");
    println!();
}

fn cargo_list(world: &World, inventory: &Inventory) -> String {
    let items: Vec<String> = inventory
        .stock
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(c, n)| format!("{n} {}", world.entities().name_of(*c)))
        .collect();
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

fn print_families(sim: &Simulation) {
    println!("  {}", "Families".bold().underline());
    println!();
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Family", "Balance"]);
    for family in sim.families() {
        table.add_row(vec![family.name.clone(), super::money(family.balance)]);
    }
    println!("{table}");
    println!();
}

fn print_json(sim: &Simulation) -> Result<(), String> {
    let world = sim.world();
    let markets: Vec<_> = placed_markets(world)
        .into_iter()
        .filter_map(|m| {
            let state = world.entities().try_get::<Market>(m)?;
            let commodities: serde_json::Map<String, serde_json::Value> = world
                .commodities()
                .iter()
                .map(|c| {
                    let stock = world.market_stock(m, *c).unwrap_or(0);
                    (
                        world.entities().name_of(*c),
                        json!({
                            "price": state.price_of(*c),
                            "demand": state.demand_for(*c),
                            "stock": stock,
                        }),
                    )
                })
                .collect();
            Some(json!({
                "name": world.entities().name_of(m),
                "population": state.population,
                "commodities": commodities,
            }))
        })
        .collect();
    let families: Vec<_> = sim
        .families()
        .iter()
        .map(|f| json!({ "name": f.name, "balance": f.balance }))
        .collect();

    let summary = json!({
        "tick": sim.current_tick(),
        "elapsed_secs": sim.clock().elapsed_secs(),
        "events": sim.events().len(),
        "markets": markets,
        "families": families,
    });
    let text = serde_json::to_string_pretty(&summary)
        .map_err(|e| format!("cannot serialize summary: {e}"))?;
    println!("{text}");
    Ok(())
}

fn colorize_event(kind: &SimEventKind, description: &str) -> colored::ColoredString {
    match kind {
        SimEventKind::Produced { .. } => description.green(),
        SimEventKind::Bought { .. } | SimEventKind::Sold { .. } => description.cyan(),
        SimEventKind::Arrived { .. } | SimEventKind::Departed { .. } => description.blue(),
        SimEventKind::Placed { .. } => description.normal(),
        SimEventKind::Destroyed { .. } => description.red(),
        SimEventKind::PopulationChanged { .. } => description.yellow(),
        SimEventKind::DwellingSpawned { .. } => description.green().bold(),
    }
}
