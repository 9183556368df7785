/// Seller's take-home estimate. Never clamped: an underwater sale reports a negative value.
pub fn net_proceeds(price: f64, loan_balance: Option<f64>, commission: f64) -> f64 {
    price - loan_balance.unwrap_or(0.0) - commission
}
