use amqp_serde::types::{FieldTable, FieldValue};

use super::{short_str, Channel};
use crate::{
    error::Error,
    frame::{Bind, BindOk, Declare, DeclareOk, Delete, DeleteOk, Method, Unbind, UnbindOk},
    Result,
};

/// Arguments for [`exchange_declare`]
///
/// [`exchange_declare`]: crate::Channel::exchange_declare
#[derive(Debug, Clone)]
pub struct ExchangeDeclareArguments {
    pub exchange: String,
    /// Exchange type, "direct", "fanout", "topic" or "headers".
    pub exchange_type: String,
    pub passive: bool,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

impl ExchangeDeclareArguments {
    /// Create declare arguments with defaults
    pub fn new(exchange: &str, exchange_type: &str) -> Self {
        Self {
            exchange: exchange.to_string(),
            exchange_type: exchange_type.to_string(),
            passive: false,
            durable: false,
            auto_delete: false,
            internal: false,
            no_wait: false,
            arguments: FieldTable::new(),
        }
    }

    /// RabbitMQ server's feature [`Alternate Exchange`]
    ///
    /// [`Alternate Exchange`]: https://www.rabbitmq.com/ae.html
    pub fn alternate_exchange(&mut self, alternate_exchange: &str) -> Result<&mut Self> {
        // exchange names are short strings even inside a field table
        let name: String = short_str(alternate_exchange)?.into();
        self.arguments.insert(
            short_str("alternate-exchange")?,
            FieldValue::S(name.try_into().map_err(|_| {
                Error::Codec(format!("invalid alternate exchange '{}'", alternate_exchange))
            })?),
        );
        Ok(self)
    }

    impl_chainable_setter! {
        passive: bool,
        durable: bool,
        auto_delete: bool,
        internal: bool,
        no_wait: bool,
        arguments: FieldTable
    }
}

/// Arguments for [`exchange_delete`]
///
/// [`exchange_delete`]: crate::Channel::exchange_delete
#[derive(Debug, Clone)]
pub struct ExchangeDeleteArguments {
    pub exchange: String,
    pub if_unused: bool,
    pub no_wait: bool,
}

impl ExchangeDeleteArguments {
    /// Create arguments with defaults
    pub fn new(exchange: &str) -> Self {
        Self {
            exchange: exchange.to_string(),
            if_unused: false,
            no_wait: false,
        }
    }

    impl_chainable_setter! {
        if_unused: bool,
        no_wait: bool
    }
}

/// Arguments for [`exchange_bind`] and [`exchange_unbind`]
///
/// [`exchange_bind`]: crate::Channel::exchange_bind
/// [`exchange_unbind`]: crate::Channel::exchange_unbind
#[derive(Debug, Clone)]
pub struct ExchangeBindArguments {
    pub destination: String,
    pub source: String,
    pub routing_key: String,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

impl ExchangeBindArguments {
    pub fn new(destination: &str, source: &str, routing_key: &str) -> Self {
        Self {
            destination: destination.to_string(),
            source: source.to_string(),
            routing_key: routing_key.to_string(),
            no_wait: false,
            arguments: FieldTable::new(),
        }
    }

    impl_chainable_setter! {
        no_wait: bool,
        arguments: FieldTable
    }
}

/////////////////////////////////////////////////////////////////////////////
/// API for Exchange methods
impl Channel {
    pub async fn exchange_declare(&self, args: ExchangeDeclareArguments) -> Result<()> {
        let mut declare = Declare {
            ticket: 0,
            exchange: short_str(&args.exchange)?,
            typ: short_str(&args.exchange_type)?,
            bits: 0,
            arguments: args.arguments,
        };
        declare.set_passive(args.passive);
        declare.set_durable(args.durable);
        declare.set_auto_delete(args.auto_delete);
        declare.set_internal(args.internal);
        declare.set_no_wait(args.no_wait);

        if args.no_wait {
            return self.send_method(declare).await;
        }
        let _: DeclareOk = synchronous_request!(self, declare, Method::DeclareOk)?;
        Ok(())
    }

    pub async fn exchange_delete(&self, args: ExchangeDeleteArguments) -> Result<()> {
        let mut delete = Delete {
            ticket: 0,
            exchange: short_str(&args.exchange)?,
            bits: 0,
        };
        delete.set_if_unused(args.if_unused);
        delete.set_no_wait(args.no_wait);

        if args.no_wait {
            return self.send_method(delete).await;
        }
        let _: DeleteOk = synchronous_request!(self, delete, Method::DeleteOk)?;
        Ok(())
    }

    pub async fn exchange_bind(&self, args: ExchangeBindArguments) -> Result<()> {
        let bind = Bind {
            ticket: 0,
            destination: short_str(&args.destination)?,
            source: short_str(&args.source)?,
            routing_key: short_str(&args.routing_key)?,
            no_wait: args.no_wait,
            arguments: args.arguments,
        };
        if args.no_wait {
            return self.send_method(bind).await;
        }
        let _: BindOk = synchronous_request!(self, bind, Method::BindOk)?;
        Ok(())
    }

    pub async fn exchange_unbind(&self, args: ExchangeBindArguments) -> Result<()> {
        let unbind = Unbind {
            ticket: 0,
            destination: short_str(&args.destination)?,
            source: short_str(&args.source)?,
            routing_key: short_str(&args.routing_key)?,
            no_wait: args.no_wait,
            arguments: args.arguments,
        };
        if args.no_wait {
            return self.send_method(unbind).await;
        }
        let _: UnbindOk = synchronous_request!(self, unbind, Method::UnbindOk)?;
        Ok(())
    }
}
