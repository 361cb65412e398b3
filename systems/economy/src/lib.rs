#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Currency ledger crediting kill rewards and debiting purchases.

use tracing::debug;
use wave_defence_core::{Event, InsufficientFunds};

/// Outcome of a purchase debit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Debit {
    /// The amount was removed from the balance.
    Accepted {
        /// Balance after the debit.
        balance: u32,
    },
    /// The balance could not cover the amount and was left unchanged.
    Rejected(InsufficientFunds),
}

/// Player currency that never goes negative and saturates on overflow.
#[derive(Debug)]
pub struct Ledger {
    balance: u32,
}

impl Ledger {
    /// Creates a ledger holding `opening` currency.
    #[must_use]
    pub const fn new(opening: u32) -> Self {
        Self { balance: opening }
    }

    /// Current balance.
    #[must_use]
    pub const fn balance(&self) -> u32 {
        self.balance
    }

    /// Reports whether `price` can be paid without rejection.
    #[must_use]
    pub const fn can_afford(&self, price: u32) -> bool {
        price <= self.balance
    }

    /// Adds `amount`, saturating at `u32::MAX`.
    ///
    /// Appends [`Event::CurrencyChanged`] to `out` when the balance moved.
    pub fn credit(&mut self, amount: u32, out: &mut Vec<Event>) {
        let balance = self.balance.saturating_add(amount);
        if balance == self.balance {
            return;
        }
        self.balance = balance;
        debug!(amount, balance, "currency credited");
        out.push(Event::CurrencyChanged { balance });
    }

    /// Removes `amount` if the balance covers it.
    pub fn debit(&mut self, amount: u32, out: &mut Vec<Event>) -> Debit {
        let Some(balance) = self.balance.checked_sub(amount) else {
            debug!(amount, balance = self.balance, "debit rejected");
            return Debit::Rejected(InsufficientFunds {
                price: amount,
                balance: self.balance,
            });
        };

        if amount > 0 {
            self.balance = balance;
            debug!(amount, balance, "currency debited");
            out.push(Event::CurrencyChanged { balance });
        }
        Debit::Accepted { balance }
    }
}
