/*!
 * # Capabilities
 *
 * Roles map to fixed capability sets. Services check capabilities, never
 * role names, so a new role only needs a new row here.
 */

use serde::Serialize;
use std::collections::BTreeSet;

use crate::entities::user::UserRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    /// Mutate one's own cart
    ManageOwnCart,
    /// Check out one's own cart
    PlaceOrders,
    /// Read and cancel one's own orders
    ViewOwnOrders,
    /// Read, update, transition and delete any order
    ManageOrders,
    ManageCoupons,
    ManagePromotions,
}

const CUSTOMER_CAPABILITIES: &[Capability] = &[
    Capability::ManageOwnCart,
    Capability::PlaceOrders,
    Capability::ViewOwnOrders,
];

const ADMIN_CAPABILITIES: &[Capability] = &[
    Capability::ManageOwnCart,
    Capability::PlaceOrders,
    Capability::ViewOwnOrders,
    Capability::ManageOrders,
    Capability::ManageCoupons,
    Capability::ManagePromotions,
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities(BTreeSet<Capability>);

impl Capabilities {
    pub fn for_role(role: UserRole) -> Self {
        let granted = match role {
            UserRole::Customer => CUSTOMER_CAPABILITIES,
            UserRole::Admin => ADMIN_CAPABILITIES,
        };
        Self(granted.iter().copied().collect())
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}
