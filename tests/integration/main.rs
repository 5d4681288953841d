//! Integration tests: full scalp and daily flows against an in-memory
//! brokerage, a recording notifier and a scripted approval channel.

mod daily_flow;
mod mock_broker;
mod scalp_flow;
