use std::fmt;

use tracing::debug;

use crate::cart::{CartAction, CartModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Decrement,
    Increment,
    QuantityInput,
}

/// A control bound to one row of one render.
///
/// Bindings are only honoured while their render is the latest one; a binding
/// kept from an earlier render is stale and dispatching it does nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Binding {
    generation: u64,
    index: usize,
    control: Control,
}

impl Binding {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn control(&self) -> Control {
        self.control
    }

    fn action(&self, input: &str) -> CartAction {
        let index = self.index;
        match self.control {
            Control::Decrement => CartAction::Decrement { index },
            Control::Increment => CartAction::Increment { index },
            Control::QuantityInput => CartAction::SetQuantity {
                index,
                input: input.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRow {
    pub product_name: String,
    pub unit_price: u64,
    pub quantity: u32,
    pub line_total: u64,
    pub decrement: Binding,
    pub quantity_input: Binding,
    pub increment: Binding,
}

impl RenderedRow {
    pub fn bindings(&self) -> [Binding; 3] {
        [self.decrement, self.quantity_input, self.increment]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCart {
    pub generation: u64,
    pub rows: Vec<RenderedRow>,
    pub total: u64,
}

impl RenderedCart {
    pub fn row(&self, index: usize) -> Option<&RenderedRow> {
        self.rows.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl fmt::Display for RenderedCart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            writeln!(f, "(cart is empty)")?;
        }
        for (index, row) in self.rows.iter().enumerate() {
            writeln!(
                f,
                "{index:>3}. {}  [-] {} [+]  ${}",
                row.product_name, row.quantity, row.line_total
            )?;
        }
        write!(f, "Total: ${}", self.total)
    }
}

/// Builds the cart's rows from scratch on every render. Each render starts a
/// new generation, which retires every binding handed out before it.
#[derive(Debug, Default)]
pub struct CartView {
    generation: u64,
}

impl CartView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn render(&mut self, cart: &CartModel) -> RenderedCart {
        self.generation += 1;
        let generation = self.generation;
        let bind = |index, control| Binding {
            generation,
            index,
            control,
        };

        let rows = cart
            .items()
            .iter()
            .enumerate()
            .map(|(index, item)| RenderedRow {
                product_name: item.product_name.clone(),
                unit_price: item.unit_price,
                quantity: item.quantity,
                line_total: item.line_total(),
                decrement: bind(index, Control::Decrement),
                quantity_input: bind(index, Control::QuantityInput),
                increment: bind(index, Control::Increment),
            })
            .collect();

        RenderedCart {
            generation,
            rows,
            total: cart.total(),
        }
    }

    /// Resolves a binding to the cart action it stands for, or `None` when the
    /// binding belongs to an older render.
    pub fn action_for(&self, binding: Binding, input: &str) -> Option<CartAction> {
        if binding.generation != self.generation {
            debug!(
                binding_generation = binding.generation,
                current_generation = self.generation,
                "ignoring control from a stale render"
            );
            return None;
        }
        Some(binding.action(input))
    }

    /// Applies a control to the cart. `input` is only read for quantity inputs.
    pub async fn dispatch(&self, cart: &mut CartModel, binding: Binding, input: &str) -> bool {
        match self.action_for(binding, input) {
            Some(action) => cart.apply(action).await,
            None => false,
        }
    }
}
