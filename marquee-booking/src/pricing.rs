use marquee_core::SeatType;
use serde::{Deserialize, Serialize};

/// Seat pricing rules relative to the showtime base price. VIP seats carry a
/// premium; COUPLE seats are sold as a pair at the base price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingRules {
    pub vip_multiplier: f64,
}

impl Default for PricingRules {
    fn default() -> Self {
        Self { vip_multiplier: 1.25 }
    }
}

impl PricingRules {
    pub fn new(vip_multiplier: f64) -> Self {
        Self { vip_multiplier }
    }

    pub fn seat_price_cents(&self, seat_type: SeatType, base_cents: i32) -> i32 {
        match seat_type {
            SeatType::Vip => (base_cents as f64 * self.vip_multiplier).round() as i32,
            SeatType::Standard | SeatType::Couple => base_cents,
        }
    }

    pub fn total_cents(&self, seats: &[SeatType], base_cents: i32) -> i32 {
        seats
            .iter()
            .map(|t| self.seat_price_cents(*t, base_cents))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vip_premium() {
        let rules = PricingRules::default();
        assert_eq!(rules.seat_price_cents(SeatType::Standard, 10000), 10000);
        assert_eq!(rules.seat_price_cents(SeatType::Vip, 10000), 12500);
        assert_eq!(rules.seat_price_cents(SeatType::Couple, 10000), 10000);
    }

    #[test]
    fn test_total_over_mixed_seats() {
        let rules = PricingRules::default();
        let seats = [SeatType::Standard, SeatType::Vip, SeatType::Couple];
        assert_eq!(rules.total_cents(&seats, 10000), 32500);
    }

    #[test]
    fn test_premium_rounds_to_cent() {
        let rules = PricingRules::new(1.25);
        // 9999 * 1.25 = 12498.75, rounds up
        assert_eq!(rules.seat_price_cents(SeatType::Vip, 9999), 12499);
    }
}
