//! Bundled table of known products.

use std::collections::BTreeSet;

use super::types::{NutritionalInfo, ProductRecord};

struct Seed {
  barcode: &'static str,
  name: &'static str,
  brand: &'static str,
  category: &'static str,
  subcategory: &'static str,
  supplier: &'static str,
  container_type: &'static str,
  weight_per_container: f64,
  cost_per_unit: f64,
  is_dry_good: bool,
  density_lbs_per_cup: Option<f64>,
  allergens: &'static [&'static str],
  nutrition: Option<(f64, f64, f64, f64, f64, f64, &'static str)>,
}

const SEEDS: &[Seed] = &[
  Seed {
    barcode: "123456789012",
    name: "All-Purpose Flour",
    brand: "King Arthur",
    category: "Baking",
    subcategory: "Flour",
    supplier: "Sysco",
    container_type: "Bag",
    weight_per_container: 50.0,
    cost_per_unit: 0.42,
    is_dry_good: true,
    density_lbs_per_cup: Some(0.275),
    allergens: &["wheat"],
    nutrition: Some((110.0, 3.0, 23.0, 0.0, 1.0, 0.0, "1/4 cup (30g)")),
  },
  Seed {
    barcode: "234567890123",
    name: "Granulated Sugar",
    brand: "Domino",
    category: "Baking",
    subcategory: "Sweeteners",
    supplier: "Sysco",
    container_type: "Bag",
    weight_per_container: 25.0,
    cost_per_unit: 0.68,
    is_dry_good: true,
    density_lbs_per_cup: Some(0.441),
    allergens: &[],
    nutrition: Some((15.0, 0.0, 4.0, 0.0, 0.0, 0.0, "1 tsp (4g)")),
  },
  Seed {
    barcode: "345678901234",
    name: "Kosher Salt",
    brand: "Diamond Crystal",
    category: "Spices",
    subcategory: "Salt",
    supplier: "US Foods",
    container_type: "Box",
    weight_per_container: 3.0,
    cost_per_unit: 1.15,
    is_dry_good: true,
    density_lbs_per_cup: Some(0.298),
    allergens: &[],
    nutrition: None,
  },
  Seed {
    barcode: "456789012345",
    name: "Extra Virgin Olive Oil",
    brand: "Colavita",
    category: "Oils",
    subcategory: "Olive Oil",
    supplier: "Restaurant Depot",
    container_type: "Tin",
    weight_per_container: 6.6,
    cost_per_unit: 5.9,
    is_dry_good: false,
    density_lbs_per_cup: Some(0.476),
    allergens: &[],
    nutrition: Some((120.0, 0.0, 0.0, 14.0, 0.0, 0.0, "1 tbsp (15ml)")),
  },
  Seed {
    barcode: "567890123456",
    name: "Long Grain White Rice",
    brand: "Mahatma",
    category: "Grains",
    subcategory: "Rice",
    supplier: "US Foods",
    container_type: "Bag",
    weight_per_container: 25.0,
    cost_per_unit: 0.89,
    is_dry_good: true,
    density_lbs_per_cup: Some(0.408),
    allergens: &[],
    nutrition: Some((160.0, 3.0, 36.0, 0.0, 0.0, 0.0, "1/4 cup (45g)")),
  },
  Seed {
    barcode: "678901234567",
    name: "Unsalted Butter",
    brand: "Land O Lakes",
    category: "Dairy",
    subcategory: "Butter",
    supplier: "Sysco",
    container_type: "Case",
    weight_per_container: 36.0,
    cost_per_unit: 3.75,
    is_dry_good: false,
    density_lbs_per_cup: Some(0.5),
    allergens: &["milk"],
    nutrition: Some((100.0, 0.0, 0.0, 11.0, 0.0, 0.0, "1 tbsp (14g)")),
  },
  Seed {
    barcode: "789012345678",
    name: "Whole Peeled Tomatoes",
    brand: "Cento",
    category: "Canned Goods",
    subcategory: "Tomatoes",
    supplier: "Restaurant Depot",
    container_type: "Can",
    weight_per_container: 6.6,
    cost_per_unit: 0.95,
    is_dry_good: false,
    density_lbs_per_cup: None,
    allergens: &[],
    nutrition: Some((20.0, 1.0, 4.0, 0.0, 1.0, 135.0, "1/2 cup (121g)")),
  },
  Seed {
    barcode: "890123456789",
    name: "Low Sodium Chicken Broth",
    brand: "Swanson",
    category: "Canned Goods",
    subcategory: "Broth",
    supplier: "Sysco",
    container_type: "Carton",
    weight_per_container: 2.0,
    cost_per_unit: 1.6,
    is_dry_good: false,
    density_lbs_per_cup: Some(0.53),
    allergens: &[],
    nutrition: Some((10.0, 1.0, 1.0, 0.0, 0.0, 140.0, "1 cup (240ml)")),
  },
];

/// Products every installation knows without a network lookup.
pub fn seed_products() -> Vec<ProductRecord> {
  SEEDS.iter().map(Seed::to_record).collect()
}

impl Seed {
  fn to_record(&self) -> ProductRecord {
    let allergens: BTreeSet<String> = self.allergens.iter().map(|a| a.to_string()).collect();

    ProductRecord {
      barcode: self.barcode.to_string(),
      name: self.name.to_string(),
      brand: self.brand.to_string(),
      category: self.category.to_string(),
      subcategory: self.subcategory.to_string(),
      supplier: self.supplier.to_string(),
      container_type: self.container_type.to_string(),
      weight_per_container: self.weight_per_container,
      cost_per_unit: self.cost_per_unit,
      is_dry_good: self.is_dry_good,
      density_lbs_per_cup: self.density_lbs_per_cup,
      ingredients: None,
      allergens: (!allergens.is_empty()).then_some(allergens),
      nutritional_info: self.nutrition.map(
        |(calories, protein, carbohydrates, fat, fiber, sodium, serving_size)| NutritionalInfo {
          calories,
          protein,
          carbohydrates,
          fat,
          fiber,
          sodium,
          serving_size: serving_size.to_string(),
        },
      ),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::products::types::is_valid_barcode;
  use std::collections::HashSet;

  #[test]
  fn test_seeds_are_unique_and_valid() {
    let products = seed_products();
    let barcodes: HashSet<_> = products.iter().map(|p| p.barcode.as_str()).collect();
    assert_eq!(barcodes.len(), products.len());

    for product in &products {
      assert!(is_valid_barcode(&product.barcode), "{}", product.barcode);
      assert!(product.weight_per_container > 0.0);
      assert!(product.cost_per_unit >= 0.0);
    }
    assert!(barcodes.contains("123456789012"));
  }
}
