/*!
 * Connection Handlers
 * Per-message reply logic run by the connection server
 */

/// Produces the reply for one received message
///
/// Called from a connection thread, once per successful receive.
pub trait ConnectionHandler: Send + Sync + 'static {
    fn respond(&self, message: &[u8]) -> Vec<u8>;
}

impl<F> ConnectionHandler for F
where
    F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
{
    fn respond(&self, message: &[u8]) -> Vec<u8> {
        self(message)
    }
}

pub const ECHO_PREFIX: &[u8] = b"You've sent: ";

/// Replies with `"You've sent: "` followed by the received bytes
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoResponder;

impl ConnectionHandler for EchoResponder {
    fn respond(&self, message: &[u8]) -> Vec<u8> {
        let mut reply = Vec::with_capacity(ECHO_PREFIX.len() + message.len());
        reply.extend_from_slice(ECHO_PREFIX);
        reply.extend_from_slice(message);
        reply
    }
}
