//! Hand-curated records served when a provider cannot produce live data.

use ohub_core::{classify, Metadata, Opportunity, OpportunityType};

use crate::ProviderKind;

/// Bump whenever the seed records below change.
pub const FALLBACK_DATASET_VERSION: &str = "2024.1";

struct Seed {
    title: &'static str,
    type_hint: &'static str,
    investment_min: f64,
    investment_max: f64,
    description: &'static str,
    location: &'static str,
    province: &'static str,
    website: Option<&'static str>,
}

const FRANCHISE_SEEDS: &[Seed] = &[
    Seed {
        title: "Maple Grind Coffee House",
        type_hint: "Food & Beverage",
        investment_min: 150_000.0,
        investment_max: 350_000.0,
        description: "Neighbourhood cafe franchise with full barista training and a proven drive-thru format.",
        location: "Toronto",
        province: "ON",
        website: Some("https://maplegrind.example.com/franchise"),
    },
    Seed {
        title: "FitLife Express Gym",
        type_hint: "Fitness",
        investment_min: 200_000.0,
        investment_max: 500_000.0,
        description: "24/7 compact fitness studio franchise with equipment financing and national marketing.",
        location: "Vancouver",
        province: "BC",
        website: Some("https://fitlifeexpress.example.com"),
    },
    Seed {
        title: "BrightPath Tutoring Centre",
        type_hint: "Education Services",
        investment_min: 75_000.0,
        investment_max: 150_000.0,
        description: "After-school tutoring franchise covering math, reading and test preparation.",
        location: "Ottawa",
        province: "ON",
        website: None,
    },
];

const REAL_ESTATE_SEEDS: &[Seed] = &[
    Seed {
        title: "Modern Downtown Condo",
        type_hint: "Condo",
        investment_min: 649_000.0,
        investment_max: 649_000.0,
        description: "Two-bedroom corner unit with lake views, steps from transit and the financial district.",
        location: "Toronto",
        province: "ON",
        website: None,
    },
    Seed {
        title: "Retail Plaza Investment Property",
        type_hint: "Commercial Retail",
        investment_min: 2_450_000.0,
        investment_max: 2_450_000.0,
        description: "Fully leased six-unit strip plaza with long-term national tenants.",
        location: "Calgary",
        province: "AB",
        website: None,
    },
];

const PUBLIC_SEEDS: &[Seed] = &[
    Seed {
        title: "Established Neighbourhood Bakery",
        type_hint: "Retail Food",
        investment_min: 180_000.0,
        investment_max: 220_000.0,
        description: "Profitable bakery operating for 15 years with loyal wholesale accounts.",
        location: "Halifax",
        province: "NS",
        website: None,
    },
    Seed {
        title: "Auto Repair Shop with Warehouse",
        type_hint: "Automotive Industrial",
        investment_min: 425_000.0,
        investment_max: 475_000.0,
        description: "Six-bay repair shop including a 4,000 sq ft warehouse and all equipment.",
        location: "Edmonton",
        province: "AB",
        website: None,
    },
    Seed {
        title: "Family-Run Hardware Store",
        type_hint: "Retail",
        investment_min: 300_000.0,
        investment_max: 300_000.0,
        description: "Turnkey hardware store in a growing suburb; owners retiring.",
        location: "Winnipeg",
        province: "MB",
        website: None,
    },
];

/// The fixed dataset for `kind`, stamped with `source_id`. Never empty.
pub fn dataset(kind: ProviderKind, source_id: &str) -> Vec<Opportunity> {
    let (seeds, opportunity_type, hint_key) = match kind {
        ProviderKind::Franchise => (FRANCHISE_SEEDS, OpportunityType::Franchise, "industry"),
        ProviderKind::RealEstate => (REAL_ESTATE_SEEDS, OpportunityType::RealEstate, "propertyType"),
        ProviderKind::Public => (PUBLIC_SEEDS, OpportunityType::Business, "industry"),
    };
    seeds
        .iter()
        .map(|seed| seed_to_opportunity(seed, opportunity_type, source_id, hint_key))
        .collect()
}

fn seed_to_opportunity(
    seed: &Seed,
    opportunity_type: OpportunityType,
    source_id: &str,
    hint_key: &str,
) -> Opportunity {
    let mut opportunity = Opportunity::new(seed.title, opportunity_type, source_id);
    opportunity.category = classify(seed.type_hint);
    opportunity.investment_min = seed.investment_min;
    opportunity.investment_max = seed.investment_max;
    opportunity.description = seed.description.to_string();
    opportunity.website = seed.website.map(ToString::to_string);
    opportunity.location = Some(seed.location.to_string());
    opportunity.province = Some(seed.province.to_string());
    opportunity.country = Some("Canada".to_string());
    opportunity.metadata = Metadata::default()
        .with_field("dataset", "fallback")
        .with_field("dataset_version", FALLBACK_DATASET_VERSION)
        .with_field(hint_key, seed.type_hint);
    opportunity
}
