use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::info;
use ts_core::component::{
    Amounts, Demander, Dweller, Footprint, Generator, Inventory, Market, Merchant, Named,
    Pickable, Price, Producer, Rates, RenderMesh, RenderTex, Trader,
};
use ts_core::entity::EntityId;
use ts_core::world::World;

use crate::error::{SimError, SimResult};
use crate::worldgen::TOWN;

/// Growth per second used when a market spec leaves it out.
pub const DEFAULT_GROWTH_RATE: f64 = 0.001;

/// Commodities, placeable blueprints, and the merchant template.
///
/// Serialized as JSON; commodities are referenced by name everywhere else in
/// the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub commodities: Vec<CommoditySpec>,
    pub blueprints: Vec<BlueprintSpec>,
    pub merchant: MerchantSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommoditySpec {
    pub name: String,
    /// Base price, before demand.
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlueprintSpec {
    pub name: String,
    /// Build cost charged to the placing family.
    #[serde(default)]
    pub price: f64,
    /// Width and depth in cells.
    pub footprint: [f32; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<GeneratorSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<ProducerSpec>,
    /// Consumption per second, by commodity name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demander: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market: Option<MarketSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trader: Option<TraderSpec>,
    /// Growth places this blueprint when a market gains population.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dwelling: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorSpec {
    pub output: String,
    /// Units per second.
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerSpec {
    #[serde(default)]
    pub inputs: BTreeMap<String, u32>,
    pub outputs: BTreeMap<String, u32>,
    /// Cycles per second.
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSpec {
    pub radius: f32,
    #[serde(default = "default_growth_rate")]
    pub growth_rate: f64,
}

fn default_growth_rate() -> f64 {
    DEFAULT_GROWTH_RATE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraderSpec {
    /// Starting trader balance.
    #[serde(default)]
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantSpec {
    pub name: String,
    #[serde(default)]
    pub balance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<String>,
}

impl Catalog {
    /// Parse and validate a catalog.
    pub fn from_json(json: &str) -> SimResult<Self> {
        let catalog: Self =
            serde_json::from_str(json).map_err(|e| SimError::Catalog(e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> SimResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SimError::Catalog(e.to_string()))
    }

    /// The catalog the game ships with.
    pub fn builtin() -> Self {
        fn names<V: Copy>(pairs: &[(&str, V)]) -> BTreeMap<String, V> {
            pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
        }
        fn commodity(name: &str, price: f64) -> CommoditySpec {
            CommoditySpec {
                name: name.into(),
                price,
                icon: Some(format!("icons/{}.png", name.to_lowercase())),
            }
        }
        fn building(name: &str, price: f64, footprint: [f32; 2], mesh: &str) -> BlueprintSpec {
            BlueprintSpec {
                name: name.into(),
                price,
                footprint,
                mesh: Some(format!("meshes/{mesh}.glb")),
                generator: None,
                producer: None,
                demander: None,
                market: None,
                trader: None,
                dwelling: false,
            }
        }
        fn trader(balance: f64) -> Option<TraderSpec> {
            Some(TraderSpec { balance })
        }

        Self {
            commodities: vec![
                commodity("Grain", 2.0),
                commodity("Wood", 3.0),
                commodity("Stone", 4.0),
                commodity("Bread", 5.0),
                commodity("Tools", 12.0),
            ],
            blueprints: vec![
                BlueprintSpec {
                    market: Some(MarketSpec {
                        radius: 5.0,
                        growth_rate: DEFAULT_GROWTH_RATE,
                    }),
                    ..building("Market", 100.0, [2.0, 2.0], "market")
                },
                BlueprintSpec {
                    generator: Some(GeneratorSpec {
                        output: "Grain".into(),
                        rate: 0.5,
                    }),
                    trader: trader(10.0),
                    ..building("Grain Field", 20.0, [2.0, 2.0], "field")
                },
                BlueprintSpec {
                    generator: Some(GeneratorSpec {
                        output: "Wood".into(),
                        rate: 0.4,
                    }),
                    trader: trader(10.0),
                    ..building("Lumber Camp", 25.0, [2.0, 1.0], "lumber_camp")
                },
                BlueprintSpec {
                    generator: Some(GeneratorSpec {
                        output: "Stone".into(),
                        rate: 0.25,
                    }),
                    trader: trader(10.0),
                    ..building("Quarry", 30.0, [2.0, 2.0], "quarry")
                },
                BlueprintSpec {
                    producer: Some(ProducerSpec {
                        inputs: names(&[("Grain", 3)]),
                        outputs: names(&[("Bread", 2)]),
                        rate: 0.25,
                    }),
                    trader: trader(30.0),
                    ..building("Bakery", 40.0, [2.0, 1.0], "bakery")
                },
                BlueprintSpec {
                    producer: Some(ProducerSpec {
                        inputs: names(&[("Wood", 2), ("Stone", 1)]),
                        outputs: names(&[("Tools", 1)]),
                        rate: 0.2,
                    }),
                    trader: trader(40.0),
                    ..building("Workshop", 60.0, [2.0, 2.0], "workshop")
                },
                BlueprintSpec {
                    demander: Some(names(&[("Bread", 0.05), ("Wood", 0.02), ("Tools", 0.01)])),
                    trader: trader(25.0),
                    dwelling: true,
                    ..building("Dwelling", 10.0, [1.0, 1.0], "dwelling")
                },
            ],
            merchant: MerchantSpec {
                name: "Merchant".into(),
                balance: 80.0,
                mesh: Some("meshes/cart.glb".into()),
            },
        }
    }

    /// Reject catalogs the simulation cannot run with.
    pub fn validate(&self) -> SimResult<()> {
        if self.commodities.is_empty() {
            return Err(SimError::Catalog("no commodities defined".into()));
        }

        let mut seen = BTreeSet::new();
        for commodity in &self.commodities {
            unique_name("commodity", &commodity.name, &mut seen)?;
            non_negative(&commodity.name, "price", commodity.price)?;
        }
        let known: BTreeSet<String> = seen;

        let mut seen = BTreeSet::new();
        let mut dwellings = 0;
        for blueprint in &self.blueprints {
            let name = blueprint.name.as_str();
            unique_name("blueprint", name, &mut seen)?;
            non_negative(name, "price", blueprint.price)?;
            let [w, h] = blueprint.footprint;
            positive(name, "footprint", f64::from(w))?;
            positive(name, "footprint", f64::from(h))?;

            if let Some(generator) = &blueprint.generator {
                positive(name, "generator rate", generator.rate)?;
                known_commodity(name, &generator.output, &known)?;
            }
            if let Some(producer) = &blueprint.producer {
                positive(name, "producer rate", producer.rate)?;
                if producer.outputs.is_empty() {
                    return Err(SimError::Catalog(format!("{name}: producer has no outputs")));
                }
                for commodity in producer.inputs.keys().chain(producer.outputs.keys()) {
                    known_commodity(name, commodity, &known)?;
                }
            }
            if let Some(demander) = &blueprint.demander {
                for (commodity, rate) in demander {
                    known_commodity(name, commodity, &known)?;
                    non_negative(name, "demand rate", *rate)?;
                }
            }
            if let Some(market) = &blueprint.market {
                positive(name, "market radius", f64::from(market.radius))?;
                if !market.growth_rate.is_finite() {
                    return Err(SimError::Catalog(format!("{name}: growth rate must be finite")));
                }
            }
            if let Some(trader) = &blueprint.trader {
                non_negative(name, "trader balance", trader.balance)?;
            }
            if blueprint.dwelling {
                dwellings += 1;
            }
        }
        if dwellings > 1 {
            return Err(SimError::Catalog(format!(
                "{dwellings} blueprints are marked as dwellings, at most one is allowed"
            )));
        }
        non_negative(&self.merchant.name, "merchant balance", self.merchant.balance)?;
        Ok(())
    }

    /// Create commodity, blueprint, and merchant entities in `world`.
    pub fn install(&self, world: &mut World) -> SimResult<()> {
        self.validate()?;

        let mut commodities = BTreeMap::new();
        for spec in &self.commodities {
            let id = world.add_commodity(spec.name.as_str(), spec.price);
            if let Some(icon) = &spec.icon {
                world.entities_mut().insert(
                    id,
                    RenderTex {
                        filename: icon.clone(),
                    },
                )?;
            }
            commodities.insert(spec.name.to_lowercase(), id);
        }

        for spec in &self.blueprints {
            let id = install_blueprint(world, spec, &commodities)?;
            world.add_blueprint(id);
            if spec.dwelling {
                world.set_dwelling_blueprint(id);
            }
        }

        let merchant = world
            .entities_mut()
            .spawn()
            .with(Named::new(self.merchant.name.as_str()))
            .with(Merchant::default())
            .with(Trader::new(TOWN, self.merchant.balance))
            .with(Inventory::default())
            .with(Pickable)
            .maybe(self.merchant.mesh.clone().map(|filename| RenderMesh { filename }))
            .id();
        world.set_merchant_blueprint(merchant);

        info!(
            commodities = self.commodities.len(),
            blueprints = self.blueprints.len(),
            "catalog installed"
        );
        Ok(())
    }
}

fn install_blueprint(
    world: &mut World,
    spec: &BlueprintSpec,
    commodities: &BTreeMap<String, EntityId>,
) -> SimResult<EntityId> {
    let resolve = |name: &str| -> SimResult<EntityId> {
        commodities
            .get(&name.to_lowercase())
            .copied()
            .ok_or_else(|| SimError::Catalog(format!("{}: unknown commodity {name}", spec.name)))
    };
    let amounts = |named: &BTreeMap<String, u32>| -> SimResult<Amounts> {
        named
            .iter()
            .map(|(name, amount)| -> SimResult<(EntityId, u32)> {
                Ok((resolve(name)?, *amount))
            })
            .collect()
    };

    let generator = match &spec.generator {
        Some(g) => Some(Generator {
            output: resolve(&g.output)?,
            rate: g.rate,
            progress: 0.0,
        }),
        None => None,
    };
    let producer = match &spec.producer {
        Some(p) => Some(Producer {
            inputs: amounts(&p.inputs)?,
            outputs: amounts(&p.outputs)?,
            rate: p.rate,
            producing: false,
            progress: 0.0,
        }),
        None => None,
    };
    let demander = match &spec.demander {
        Some(rates) => {
            let rate = rates
                .iter()
                .map(|(name, rate)| -> SimResult<(EntityId, f64)> { Ok((resolve(name)?, *rate)) })
                .collect::<SimResult<Rates>>()?;
            Some(Demander::new(rate))
        }
        None => None,
    };
    let stocked = generator.is_some()
        || producer.is_some()
        || demander.is_some()
        || spec.trader.is_some();

    let [w, h] = spec.footprint;
    let id = world
        .entities_mut()
        .spawn()
        .with(Named::new(spec.name.as_str()))
        .with(Price { price: spec.price })
        .with(Footprint::new(w, h))
        .with(Pickable)
        .maybe(spec.mesh.clone().map(|filename| RenderMesh { filename }))
        .maybe(generator)
        .maybe(producer)
        .maybe(demander)
        .maybe(
            spec.market
                .as_ref()
                .map(|m| Market::new(m.radius, m.growth_rate)),
        )
        .maybe(spec.trader.as_ref().map(|t| Trader::new(TOWN, t.balance)))
        .maybe(stocked.then(Inventory::default))
        .maybe(spec.dwelling.then_some(Dweller))
        .id();
    Ok(id)
}

fn unique_name(kind: &str, name: &str, seen: &mut BTreeSet<String>) -> SimResult<()> {
    if name.trim().is_empty() {
        return Err(SimError::Catalog(format!("{kind} with an empty name")));
    }
    if !seen.insert(name.to_lowercase()) {
        return Err(SimError::Catalog(format!("duplicate {kind} name: {name}")));
    }
    Ok(())
}

fn known_commodity(owner: &str, name: &str, known: &BTreeSet<String>) -> SimResult<()> {
    if known.contains(&name.to_lowercase()) {
        Ok(())
    } else {
        Err(SimError::Catalog(format!("{owner}: unknown commodity {name}")))
    }
}

fn positive(owner: &str, what: &str, value: f64) -> SimResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimError::Catalog(format!(
            "{owner}: {what} must be positive, got {value}"
        )))
    }
}

fn non_negative(owner: &str, what: &str, value: f64) -> SimResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SimError::Catalog(format!(
            "{owner}: {what} must not be negative, got {value}"
        )))
    }
}
