//! # M-Pesa tools
//!
//! A small async client for the parts of the Safaricom Daraja API that a storefront needs:
//!
//! * OAuth access tokens, cached and refreshed lazily ([`TokenCache`]).
//! * Lipa na M-Pesa Online ("STK push") initiation and status queries.
//! * Transaction reversals.
//! * Parsing of the asynchronous STK callback payload.
//!
//! The client knows nothing about orders or inventory. Mapping M-Pesa results onto payment outcomes is done by the
//! caller.
mod api;
mod config;
mod data_objects;
mod error;
pub mod helpers;
mod token;

pub use api::{MpesaApi, StkPushParams, TOKEN_SAFETY_MARGIN};
pub use config::{MpesaConfig, SANDBOX_BASE_URL};
pub use data_objects::{
    AccessTokenResponse,
    CallbackItem,
    CallbackMetadata,
    ProviderErrorBody,
    ReversalRequest,
    ReversalResponse,
    StkCallback,
    StkCallbackBody,
    StkCallbackEnvelope,
    StkPushRequest,
    StkPushResponse,
    StkQueryRequest,
    StkQueryResponse,
    TimeoutNotice,
};
pub use error::MpesaApiError;
pub use helpers::{StkResultKind, STK_STILL_PROCESSING};
pub use token::{AccessToken, TokenCache};
