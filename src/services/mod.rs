/// Line and bingo claim verification policies.
pub mod claims;
/// Per-room command queues and their workers.
pub mod dispatcher;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Room session engine: the operations behind every room command.
pub mod room_engine;
/// Room broadcasts and private deliveries.
pub mod room_events;
/// REST facing room operations.
pub mod room_service;
/// Server-Sent Events spectator streams.
pub mod sse_service;
/// Storage connection supervisor driving degraded mode.
pub mod storage_supervisor;
/// Player WebSocket connection handling.
pub mod websocket_service;

#[cfg(test)]
pub mod test_support;
