/// Protocol version reported by `/health` and `/info`
pub const PROTOCOL_VERSION: &str = "nexus/1";

/// Application name
pub const APP_NAME: &str = "Nexus Chat";

/// Default HTTP / WebSocket port
pub const DEFAULT_HTTP_PORT: u16 = 5000;

/// Per-connection outbound queue depth before events are dropped for that client
pub const DEFAULT_OUTBOUND_QUEUE: usize = 256;

/// Capacity of the hub command channel
pub const DEFAULT_HUB_QUEUE: usize = 1024;

/// Largest inbound text frame accepted (voice notes travel inline, 8 MiB)
pub const MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

// Inbound event names
pub const EVENT_REGISTER: &str = "user:register";
pub const EVENT_SET_STATUS: &str = "user:status";
pub const EVENT_TYPING: &str = "user:typing";
pub const EVENT_CREATE_CHAT: &str = "chat:create";
pub const EVENT_JOIN_CHAT: &str = "chat:join";
pub const EVENT_LEAVE_CHAT: &str = "chat:leave";
pub const EVENT_SEND_MESSAGE: &str = "message:send";
pub const EVENT_EDIT_MESSAGE: &str = "message:edit";
pub const EVENT_DELETE_MESSAGE: &str = "message:delete";
pub const EVENT_REACT: &str = "message:react";
pub const EVENT_READ: &str = "message:read";

// Outbound event names not shared with inbound ones
pub const EVENT_USERS_LIST: &str = "users:list";
pub const EVENT_CHAT_CREATED: &str = "chat:created";
pub const EVENT_MESSAGE_NEW: &str = "message:new";
pub const EVENT_MESSAGE_UPDATED: &str = "message:updated";
pub const EVENT_MESSAGE_DELETED: &str = "message:deleted";
pub const EVENT_ACK: &str = "ack";
