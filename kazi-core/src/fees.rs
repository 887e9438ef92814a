//! Escrow fee breakdown.
//!
//! Every escrowed amount pays a flat platform percentage, a processing
//! percentage that depends on how the funds came in, and a fixed
//! withdrawal fee in the invoice currency.

use serde::{Deserialize, Serialize};

use crate::PaymentMethod;

pub const PLATFORM_PERCENTAGE: f64 = 3.0;
pub const WITHDRAWAL_FEE: f64 = 50.0;

impl PaymentMethod {
    /// Processing fee in percent of the escrowed amount.
    pub const fn processing_percentage(&self) -> f64 {
        match self {
            PaymentMethod::Stripe | PaymentMethod::CreditCard => 2.9,
            PaymentMethod::Paypal => 3.49,
            PaymentMethod::BankTransfer | PaymentMethod::WireTransfer => 1.0,
            PaymentMethod::Crypto => 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EscrowFees {
    pub amount: f64,
    pub payment_method: PaymentMethod,
    pub platform_percentage: f64,
    pub platform_fee: f64,
    pub payment_percentage: f64,
    pub payment_fee: f64,
    pub withdrawal_fee: f64,
    pub total_fees: f64,
    /// What the payee receives once fees are taken. Never negative.
    pub net_amount: f64,
}

impl EscrowFees {
    pub fn calculate(amount: f64, payment_method: PaymentMethod) -> Self {
        let payment_percentage = payment_method.processing_percentage();
        let platform_fee = amount * PLATFORM_PERCENTAGE / 100.0;
        let payment_fee = amount * payment_percentage / 100.0;
        let total_fees = platform_fee + payment_fee + WITHDRAWAL_FEE;
        Self {
            amount,
            payment_method,
            platform_percentage: PLATFORM_PERCENTAGE,
            platform_fee,
            payment_percentage,
            payment_fee,
            withdrawal_fee: WITHDRAWAL_FEE,
            total_fees,
            net_amount: (amount - total_fees).max(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_card_payment_breakdown() {
        let fees = EscrowFees::calculate(1000.0, PaymentMethod::Stripe);
        assert!(close(fees.platform_fee, 30.0));
        assert!(close(fees.payment_fee, 29.0));
        assert!(close(fees.withdrawal_fee, 50.0));
        assert!(close(fees.total_fees, 109.0));
        assert!(close(fees.net_amount, 891.0));

        let card = EscrowFees::calculate(1000.0, PaymentMethod::CreditCard);
        assert_eq!(card.total_fees, fees.total_fees);
        assert_eq!(card.payment_method, PaymentMethod::CreditCard);
    }

    #[test]
    fn test_rate_follows_payment_method() {
        let rates = [
            (PaymentMethod::Paypal, 3.49),
            (PaymentMethod::BankTransfer, 1.0),
            (PaymentMethod::WireTransfer, 1.0),
            (PaymentMethod::Crypto, 1.5),
        ];
        for (method, rate) in rates {
            let fees = EscrowFees::calculate(200.0, method);
            assert!(close(fees.payment_percentage, rate), "{}", method);
            assert!(close(fees.payment_fee, 2.0 * rate), "{}", method);
            assert!(close(fees.platform_fee, 6.0));
        }
    }

    #[test]
    fn test_small_amounts_keep_flat_fee_and_floor_net() {
        let fees = EscrowFees::calculate(0.0, PaymentMethod::Crypto);
        assert!(close(fees.total_fees, WITHDRAWAL_FEE));
        assert_eq!(fees.net_amount, 0.0);

        let fees = EscrowFees::calculate(40.0, PaymentMethod::Paypal);
        assert!(fees.total_fees > fees.amount);
        assert_eq!(fees.net_amount, 0.0);
    }
}
