//! The linking step: hand control of one confirmed artifact to another.

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, Bytes, keccak256},
};

use crate::{
    client::{CallRequest, ChainClient},
    errors::{ClientError, DeployError},
    manifest::{DeploymentResult, LinkingAction, StepStatus},
};

/// Calldata for `signature` (a `name(address)` function) called with `arg`.
pub fn link_calldata(signature: &str, arg: Address) -> Bytes {
    let selector = &keccak256(signature.as_bytes())[..4];
    let encoded = DynSolValue::Tuple(vec![DynSolValue::Address(arg)]).abi_encode_params();

    let mut data = Vec::with_capacity(4 + encoded.len());
    data.extend_from_slice(selector);
    data.extend_from_slice(&encoded);
    data.into()
}

/// Confirmed addresses of `(target, new_owner)`, or why linking cannot proceed.
pub fn linkable(
    target: &DeploymentResult,
    new_owner: &DeploymentResult,
) -> Result<(Address, Address), DeployError> {
    let confirmed = |step: &DeploymentResult| {
        step.address.filter(|_| step.is_confirmed()).ok_or_else(|| {
            DeployError::linking(
                &target.artifact,
                format!("`{}` is not confirmed ({})", step.artifact, step.status),
            )
        })
    };

    Ok((confirmed(target)?, confirmed(new_owner)?))
}

/// Submit the linking call. The returned action is [`StepStatus::Submitted`].
pub async fn submit_link<C: ChainClient>(
    client: &C,
    target: &DeploymentResult,
    new_owner: &DeploymentResult,
    function: &str,
    nonce: u64,
    gas_price: u128,
) -> Result<LinkingAction, DeployError> {
    let (target_address, new_owner_address) = linkable(target, new_owner)?;

    tracing::info!(
        target = %target.artifact,
        new_owner = %new_owner.artifact,
        function,
        nonce,
        "Submitting linking call"
    );

    let tx_hash = client
        .send_call(CallRequest {
            to: target_address,
            data: link_calldata(function, new_owner_address),
            nonce,
            gas_price,
        })
        .await
        .map_err(|e| match e {
            ClientError::NonceConflict(_) => DeployError::NonceConflict {
                step: format!("link:{}", target.artifact),
                expected: nonce,
                observed: None,
            },
            e => DeployError::linking(&target.artifact, format!("submission failed: {e}")),
        })?;

    Ok(LinkingAction {
        target: target.artifact.clone(),
        target_address,
        new_owner: new_owner.artifact.clone(),
        new_owner_address,
        function: function.to_string(),
        nonce,
        tx_hash: Some(tx_hash),
        status: StepStatus::Submitted,
    })
}

/// Wait for a submitted linking call to be included.
///
/// A reverted call means the artifact's authorization rule rejected it. The
/// resulting ownership is not read back; that is the contracts' concern.
pub async fn confirm_link<C: ChainClient>(
    client: &C,
    action: &mut LinkingAction,
) -> Result<(), DeployError> {
    let Some(tx_hash) = action.tx_hash else {
        return Err(DeployError::linking(&action.target, "call was never submitted"));
    };

    let receipt = client.wait_for_receipt(tx_hash).await.map_err(|e| {
        action.status = StepStatus::Failed;
        DeployError::linking(&action.target, format!("not confirmed: {e}"))
    })?;

    if !receipt.success {
        action.status = StepStatus::Failed;
        return Err(DeployError::linking(
            &action.target,
            format!("{} reverted in {tx_hash}", action.function),
        ));
    }

    action.status = StepStatus::Confirmed;
    tracing::info!(
        target = %action.target,
        new_owner = %action.new_owner,
        tx_hash = %tx_hash,
        "Linking call confirmed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::{TxHash, address};

    fn result(artifact: &str, status: StepStatus, address: Option<Address>) -> DeploymentResult {
        DeploymentResult {
            artifact: artifact.to_string(),
            args: vec![],
            nonce: 0,
            gas_price: 0,
            tx_hash: Some(TxHash::ZERO),
            address,
            status,
        }
    }

    #[test]
    fn test_transfer_ownership_calldata() {
        let owner = address!("cccccccccccccccccccccccccccccccccccccccc");
        let data = link_calldata("transferOwnership(address)", owner);

        // keccak256("transferOwnership(address)") = 0xf2fde38b...
        assert_eq!(&data[..4], &[0xf2, 0xfd, 0xe3, 0x8b]);
        assert_eq!(data.len(), 36);
        assert_eq!(&data[16..36], owner.as_slice());
    }

    #[test]
    fn test_linkable_requires_both_confirmed() {
        let b = address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
        let c = address!("cccccccccccccccccccccccccccccccccccccccc");

        let building = result("Building", StepStatus::Confirmed, Some(b));
        let town_hall = result("TownHall", StepStatus::Confirmed, Some(c));
        assert_eq!(linkable(&building, &town_hall).unwrap(), (b, c));

        let pending = result("TownHall", StepStatus::Submitted, None);
        assert!(matches!(
            linkable(&building, &pending),
            Err(DeployError::Linking { .. })
        ));

        let failed = result("Building", StepStatus::Failed, Some(b));
        assert!(linkable(&failed, &town_hall).is_err());
    }
}
