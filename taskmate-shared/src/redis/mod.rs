/// Redis integration
///
/// Only a connection wrapper lives here; the API builds its completion rate
/// limiter on top of [`client::RedisClient::eval_script`].

pub mod client;
