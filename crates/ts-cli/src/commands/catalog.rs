use std::path::Path;

use colored::Colorize;
use comfy_table::{ContentArrangement, Table};
use ts_simulation::catalog::BlueprintSpec;

pub fn run(path: Option<&Path>) -> Result<(), String> {
    let catalog = super::load_catalog(path)?;

    println!("  {}", "Commodities".bold().underline());
    println!();
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Commodity", "Base price"]);
    for commodity in &catalog.commodities {
        table.add_row(vec![commodity.name.clone(), super::money(commodity.price)]);
    }
    println!("{table}");
    println!();

    println!("  {}", "Blueprints".bold().underline());
    println!();
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Blueprint", "Size", "Cost", "Role"]);
    for blueprint in &catalog.blueprints {
        let [w, h] = blueprint.footprint;
        table.add_row(vec![
            blueprint.name.clone(),
            format!("{w}x{h}"),
            super::money(blueprint.price),
            describe(blueprint),
        ]);
    }
    println!("{table}");
    println!();
    println!(
        "  {} commodities, {} blueprints, merchant template '{}'",
        catalog.commodities.len(),
        catalog.blueprints.len(),
        catalog.merchant.name
    );

    Ok(())
}

fn describe(blueprint: &BlueprintSpec) -> String {
    let mut roles = Vec::new();
    if let Some(market) = &blueprint.market {
        roles.push(format!("market, radius {}", market.radius));
    }
    if let Some(generator) = &blueprint.generator {
        roles.push(format!("makes {} ({}/s)", generator.output, generator.rate));
    }
    if let Some(producer) = &blueprint.producer {
        let list = |amounts: &std::collections::BTreeMap<String, u32>| {
            amounts
                .iter()
                .map(|(name, n)| format!("{n} {name}"))
                .collect::<Vec<_>>()
                .join(" + ")
        };
        roles.push(format!(
            "{} -> {} ({}/s)",
            list(&producer.inputs),
            list(&producer.outputs),
            producer.rate
        ));
    }
    if let Some(demander) = &blueprint.demander {
        let wants: Vec<&str> = demander.keys().map(String::as_str).collect();
        roles.push(format!("consumes {}", wants.join(", ")));
    }
    if blueprint.dwelling {
        roles.push("dwelling".into());
    }
    if roles.is_empty() {
        "-".into()
    } else {
        roles.join("; ")
    }
}
