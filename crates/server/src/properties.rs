//! Trader descriptors and the merchant catalog.

use barter_wire::{CompoundTag, ListTag};
use barter_world::{EntityId, ItemStack, NetworkProperty, signed_runtime_id};

/// Cumulative trade experience required to reach tiers 0..=4.
pub const TIER_EXP_REQUIREMENTS: [i32; 5] = [0, 10, 60, 160, 310];

/// Who the client is trading with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counterparty {
    /// An entity that already exists in the world.
    Live(EntityId),
    /// A trader materialized for this session only.
    Synthetic,
}

/// Counterparty after open: always carries the runtime id the client sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedCounterparty {
    Live(EntityId),
    Synthetic(EntityId),
}

impl ResolvedCounterparty {
    pub fn runtime_id(&self) -> EntityId {
        match *self {
            Self::Live(id) | Self::Synthetic(id) => id,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, Self::Synthetic(_))
    }
}

/// Descriptor of the trade counterparty, built by whoever starts the trade.
#[derive(Debug, Clone, PartialEq)]
pub struct TraderProperties {
    pub trader_name: String,
    pub trade_tier: i32,
    pub xp: i32,
    pub max_trade_tier: i32,
    pub tier_exp_requirements: [i32; 5],
    pub counterparty: Counterparty,
}

impl TraderProperties {
    /// Properties for a trader spawned just for this session.
    pub fn synthetic(trader_name: impl Into<String>) -> Self {
        Self::new(trader_name, Counterparty::Synthetic)
    }

    /// Properties for an existing world entity.
    pub fn live(trader_name: impl Into<String>, entity: EntityId) -> Self {
        Self::new(trader_name, Counterparty::Live(entity))
    }

    fn new(trader_name: impl Into<String>, counterparty: Counterparty) -> Self {
        Self {
            trader_name: trader_name.into(),
            trade_tier: 0,
            xp: 0,
            max_trade_tier: 4,
            tier_exp_requirements: TIER_EXP_REQUIREMENTS,
            counterparty,
        }
    }

    pub fn with_tier(mut self, trade_tier: i32, xp: i32, max_trade_tier: i32) -> Self {
        self.trade_tier = trade_tier;
        self.xp = xp;
        self.max_trade_tier = max_trade_tier;
        self
    }

    /// The four replicated properties describing this trader while it is
    /// engaged with `trading_player`.
    pub fn network_properties(&self, trading_player: EntityId) -> [(NetworkProperty, i64); 4] {
        [
            (NetworkProperty::TradeTier, i64::from(self.trade_tier)),
            (NetworkProperty::TradeXp, i64::from(self.xp)),
            (NetworkProperty::MaxTradeTier, i64::from(self.max_trade_tier)),
            (NetworkProperty::TradingPlayer, signed_runtime_id(trading_player)),
        ]
    }

    /// Threshold table as the list of single-entry compounds the client expects.
    pub fn tier_exp_requirements_tag(&self) -> ListTag {
        self.tier_exp_requirements
            .iter()
            .enumerate()
            .map(|(tier, exp)| CompoundTag::new().with_int(tier.to_string(), *exp))
            .collect()
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Source of the recipe list shown in the trade UI. Opaque to the core.
pub trait RecipeCatalog {
    fn to_wire_format(&self) -> ListTag;
}

/// A single merchant recipe.
#[derive(Debug, Clone, PartialEq)]
pub struct MerchantRecipe {
    pub buy_a: ItemStack,
    pub buy_b: Option<ItemStack>,
    pub sell: ItemStack,
    pub tier: i32,
    pub max_uses: i32,
    pub uses: i32,
    pub trader_exp: i32,
    pub price_multiplier_a: f32,
    pub price_multiplier_b: f32,
}

impl MerchantRecipe {
    pub fn new(buy_a: ItemStack, sell: ItemStack) -> Self {
        Self {
            buy_a,
            buy_b: None,
            sell,
            tier: 0,
            max_uses: 999,
            uses: 0,
            trader_exp: 0,
            price_multiplier_a: 0.0,
            price_multiplier_b: 0.0,
        }
    }

    pub fn with_buy_b(mut self, buy_b: ItemStack) -> Self {
        self.buy_b = Some(buy_b);
        self
    }

    pub fn with_tier(mut self, tier: i32) -> Self {
        self.tier = tier;
        self
    }

    fn to_tag(&self) -> CompoundTag {
        let mut tag = CompoundTag::new()
            .with_compound("buyA", item_tag(&self.buy_a))
            .with_compound("sell", item_tag(&self.sell))
            .with_int("tier", self.tier)
            .with_int("maxUses", self.max_uses)
            .with_int("uses", self.uses)
            .with_int("traderExp", self.trader_exp)
            .with_float("priceMultiplierA", self.price_multiplier_a)
            .with_float("priceMultiplierB", self.price_multiplier_b);
        if let Some(buy_b) = &self.buy_b {
            tag = tag.with_compound("buyB", item_tag(buy_b));
        }
        tag
    }
}

fn item_tag(item: &ItemStack) -> CompoundTag {
    CompoundTag::new()
        .with_int("id", tag_int(item.item_type))
        .with_int("Count", tag_int(item.count))
}

/// Item ids and counts are unsigned in memory but `Int` tags are signed.
/// Values past `i32::MAX` saturate instead of wrapping negative.
fn tag_int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Ordered list of merchant recipes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MerchantRecipeList {
    recipes: Vec<MerchantRecipe>,
}

impl MerchantRecipeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, recipe: MerchantRecipe) {
        self.recipes.push(recipe);
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

impl FromIterator<MerchantRecipe> for MerchantRecipeList {
    fn from_iter<I: IntoIterator<Item = MerchantRecipe>>(iter: I) -> Self {
        Self {
            recipes: iter.into_iter().collect(),
        }
    }
}

impl RecipeCatalog for MerchantRecipeList {
    fn to_wire_format(&self) -> ListTag {
        self.recipes.iter().map(MerchantRecipe::to_tag).collect()
    }
}

/// Build the `UpdateTrade` offers payload.
pub fn offers_payload(catalog: &dyn RecipeCatalog, properties: &TraderProperties) -> CompoundTag {
    CompoundTag::new()
        .with_list("Recipes", catalog.to_wire_format())
        .with_list("TierExpRequirements", properties.tier_exp_requirements_tag())
}
