mod callbacks;
mod helpers;
mod mocks;
mod orders;
mod payments;
mod stock;
