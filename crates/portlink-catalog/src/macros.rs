/// Declarative macro generating a closed, enumerable event catalogue from a
/// single declaration.
///
/// One `define_catalog!` invocation produces, for a catalogue `Foo` with
/// channel structs `FooClient` / `FooPort`:
///
/// - `Foo`, a marker type carrying `Foo::NAMES` — every declared wire name,
///   in declaration order
/// - `FooClient`, one typed client-side channel field per declared name,
///   built by `FooClient::new(&ClientNode)` in a single synchronous pass
/// - `FooPort`, the primary-side mirror, built by `FooPort::new(&PortHub)`
///
/// Construction fails with [`CatalogError::ReservedName`](crate::CatalogError)
/// when a declared name collides with the `:response` / `:error` reply
/// convention; nothing is checked at send time, because the catalogue is the
/// only way consumers reach the wire.
///
/// # Sections
///
/// - **`events`**: fire-and-forget channels, `field => "wire.name" => Payload`.
/// - **`requests`**: request/response channels,
///   `field => "wire.name" => Input => Output`.
///
/// # Example
///
/// ```ignore
/// define_catalog! {
///     pub catalog Browser {
///         client: BrowserClient,
///         port: BrowserPort,
///         events {
///             theme_changed => "theme.changed" => Theme,
///         }
///         requests {
///             get_page_info => "page.getInfo" => PageQuery => PageInfo,
///         }
///     }
/// }
/// ```
#[macro_export]
macro_rules! define_catalog {
    (
        $(#[$cmeta:meta])*
        $vis:vis catalog $catalog:ident {
            client: $client:ident,
            port: $port:ident,
            events {
                $(
                    $(#[$emeta:meta])*
                    $efield:ident => $ename:literal => $ety:ty
                ),* $(,)?
            }
            requests {
                $(
                    $(#[$rmeta:meta])*
                    $rfield:ident => $rname:literal => $rin:ty => $rout:ty
                ),* $(,)?
            }
        }
    ) => {
        $(#[$cmeta])*
        $vis struct $catalog;

        impl $catalog {
            /// Every wire name the catalogue declares, in declaration order.
            pub const NAMES: &'static [&'static str] = &[$($ename,)* $($rname,)*];
        }

        /// Client-side typed channels, one per declared name.
        $vis struct $client {
            $(
                $(#[$emeta])*
                pub $efield: $crate::ClientEventChannel<$ety>,
            )*
            $(
                $(#[$rmeta])*
                pub $rfield: $crate::ClientRequestChannel<$rin, $rout>,
            )*
        }

        impl $client {
            /// Build every channel against `node` in one synchronous pass.
            pub fn new(node: &$crate::ClientNode) -> Result<Self, $crate::CatalogError> {
                Ok(Self {
                    $($efield: $crate::ClientEventChannel::new(node, $ename)?,)*
                    $($rfield: $crate::ClientRequestChannel::new(node, $rname)?,)*
                })
            }
        }

        /// Primary-side typed channels, one per declared name.
        $vis struct $port {
            $(
                $(#[$emeta])*
                pub $efield: $crate::PortEventChannel<$ety>,
            )*
            $(
                $(#[$rmeta])*
                pub $rfield: $crate::PortRequestChannel<$rin, $rout>,
            )*
        }

        impl $port {
            /// Build every channel against `hub` in one synchronous pass.
            pub fn new(hub: &$crate::PortHub) -> Result<Self, $crate::CatalogError> {
                Ok(Self {
                    $($efield: $crate::PortEventChannel::new(hub, $ename)?,)*
                    $($rfield: $crate::PortRequestChannel::new(hub, $rname)?,)*
                })
            }
        }
    };
}
