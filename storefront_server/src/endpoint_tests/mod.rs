mod cart;
mod checkout;
mod coupons;
mod helpers;
mod mocks;
mod orders;
mod webhooks;
